use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tracing::info;
use tract_onnx::prelude::*;

use crate::{nms_filter, postprocess_yolov8, Detection, Detector, Frame, VisionConfig};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX backend (tract). Built for YOLOv8 exports: input `[1, 3, H, W]` f32
/// in 0..1, output `[1, 4 + C, N]`.
pub struct OnnxDetector {
    cfg: VisionConfig,
    plan: Plan,
}

impl OnnxDetector {
    pub fn new(cfg: &VisionConfig) -> Result<Self> {
        let plan = tract_onnx::onnx()
            .model_for_path(&cfg.model_path)
            .with_context(|| format!("failed to load ONNX model from {}", cfg.model_path))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, cfg.img_h as usize, cfg.img_w as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        info!("vision: loaded ONNX model: {}", cfg.model_path);
        Ok(Self { cfg: cfg.clone(), plan })
    }

    pub fn inspect(&self) -> Result<String> {
        let model = self.plan.model();
        let mut out = String::from("ONNX inspect:\n");
        for (i, outlet) in model.input_outlets()?.iter().enumerate() {
            out.push_str(&format!("- input[{}] {:?}\n", i, model.outlet_fact(*outlet)?));
        }
        for (i, outlet) in model.output_outlets()?.iter().enumerate() {
            out.push_str(&format!("- output[{}] {:?}\n", i, model.outlet_fact(*outlet)?));
        }
        Ok(out)
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let (w, h) = (self.cfg.img_w, self.cfg.img_h);
        let resized = image::imageops::resize(&frame.image, w, h, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, h as usize, w as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }
}

impl Detector for OnnxDetector {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn detect(&mut self, frame: &Frame, conf_th: f32) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self.plan.run(tvec!(input.into())).context("ONNX inference failed")?;
        let output = outputs.first().ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output.to_array_view::<f32>().context("model output tensor was not f32")?;

        let nc = self.cfg.num_classes;
        let (channels, num_preds) = match view.shape() {
            [1, c, n] => (*c, *n),
            other => anyhow::bail!("unexpected output dims {:?}, expected [1, {}, N]", other, 4 + nc),
        };
        anyhow::ensure!(
            self.cfg.output_layout == "yolov8",
            "onnx backend supports output_layout = \"yolov8\" only (got {})",
            self.cfg.output_layout
        );
        anyhow::ensure!(channels == 4 + nc, "channel mismatch: got {}, expected {}", channels, 4 + nc);

        let raw: Vec<f32> = view.iter().copied().collect();
        let dets = postprocess_yolov8(&raw, num_preds, nc, conf_th, self.cfg.img_w, self.cfg.img_h);
        Ok(nms_filter(dets, self.cfg.nms_iou_threshold, self.cfg.max_detections))
    }
}
