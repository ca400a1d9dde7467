mod nms;
pub mod annotate;
pub mod camera;
pub mod doctor;
pub mod frame;
#[cfg(feature = "vision-onnx")]
pub mod onnx;
#[cfg(feature = "vision-tflite")]
pub mod tflite;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use frame::Frame;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: i32,
    pub conf: f32,
    // normalized 0..1
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    pub backend: String, // "onnx" | "tflite"
    pub model_path: String,

    pub img_w: u32,
    pub img_h: u32,
    pub num_classes: usize,
    pub class_names: Vec<String>,
    #[serde(default = "default_target_class")]
    pub target_class: String,

    pub nms_iou_threshold: f32,
    pub max_detections: usize,
    pub output_layout: String, // "yolov8" | "ultralytics"
}

fn default_target_class() -> String {
    "person".into()
}

impl VisionConfig {
    pub fn target_class_id(&self) -> Result<i32> {
        self.class_names
            .iter()
            .position(|c| c == &self.target_class)
            .map(|i| i as i32)
            .with_context(|| format!("vision.target_class {:?} not in class_names", self.target_class))
    }
}

/// A loaded model. Returns every class above `conf_th`, after NMS.
pub trait Detector: Send {
    fn name(&self) -> &'static str;
    fn detect(&mut self, frame: &Frame, conf_th: f32) -> Result<Vec<Detection>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame, conf_th: f32) -> Result<Vec<Detection>> {
        (**self).detect(frame, conf_th)
    }
}

/// Detections of the target class for one frame. Only `len()` feeds the metrics.
#[derive(Debug, Clone, Default)]
pub struct DetectionSet {
    pub boxes: Vec<Detection>,
}

impl DetectionSet {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// Runs a model and keeps only one class (people) at or above the threshold.
pub struct PersonDetector<D> {
    inner: D,
    target_class: i32,
}

impl<D: Detector> PersonDetector<D> {
    pub fn new(inner: D, target_class: i32) -> Self {
        Self { inner, target_class }
    }

    pub fn from_config(inner: D, cfg: &VisionConfig) -> Result<Self> {
        Ok(Self::new(inner, cfg.target_class_id()?))
    }

    pub fn backend(&self) -> &'static str {
        self.inner.name()
    }

    pub fn detect(&mut self, frame: &Frame, conf_th: f32) -> Result<DetectionSet> {
        anyhow::ensure!(!frame.is_empty(), "empty frame {}x{}", frame.width(), frame.height());
        let dets = self
            .inner
            .detect(frame, conf_th)
            .with_context(|| format!("{} inference", self.inner.name()))?;
        let boxes = dets
            .into_iter()
            .filter(|d| d.class_id == self.target_class && d.conf >= conf_th)
            .collect();
        Ok(DetectionSet { boxes })
    }
}

pub fn postprocess_ultralytics(
    raw: &[f32],
    num_preds: usize,
    num_classes: usize,
    conf_th: f32,
) -> Vec<Detection> {
    // [cx, cy, w, h, obj, cls0..] per prediction, already normalized
    let stride = 5 + num_classes;
    let mut out = Vec::new();

    for i in 0..num_preds {
        let base = i * stride;
        if base + stride > raw.len() { break; }
        let obj = raw[base + 4];

        let (best_c, best_p) = best_class(num_classes, |c| raw[base + 5 + c]);
        let conf = obj * best_p;
        if conf >= conf_th {
            out.push(Detection {
                class_id: best_c as i32,
                conf,
                cx: raw[base],
                cy: raw[base + 1],
                w: raw[base + 2],
                h: raw[base + 3],
            });
        }
    }
    out
}

/// YOLOv8 export: channel-major `[4 + C, N]`, boxes in input pixels, no objectness.
pub fn postprocess_yolov8(
    raw: &[f32],
    num_preds: usize,
    num_classes: usize,
    conf_th: f32,
    img_w: u32,
    img_h: u32,
) -> Vec<Detection> {
    let n = num_preds;
    if raw.len() < (4 + num_classes) * n {
        return Vec::new();
    }
    let (sw, sh) = (img_w.max(1) as f32, img_h.max(1) as f32);
    let mut out = Vec::new();

    for i in 0..n {
        let (best_c, conf) = best_class(num_classes, |c| raw[(4 + c) * n + i]);
        if conf >= conf_th {
            out.push(Detection {
                class_id: best_c as i32,
                conf,
                cx: raw[i] / sw,
                cy: raw[n + i] / sh,
                w: raw[2 * n + i] / sw,
                h: raw[3 * n + i] / sh,
            });
        }
    }
    out
}

fn best_class(num_classes: usize, score: impl Fn(usize) -> f32) -> (usize, f32) {
    let mut best_c = 0usize;
    let mut best_p = 0.0f32;
    for c in 0..num_classes {
        let p = score(c);
        if p > best_p { best_p = p; best_c = c; }
    }
    (best_c, best_p)
}

pub fn nms_filter(mut dets: Vec<Detection>, iou_th: f32, max_det: usize) -> Vec<Detection> {
    dets.sort_by(|a, b| b.conf.partial_cmp(&a.conf).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<Detection> = Vec::new();

    'outer: for d in dets {
        for k in &kept {
            if d.class_id == k.class_id && nms::iou(&d, k) >= iou_th {
                continue 'outer;
            }
        }
        kept.push(d);
        if kept.len() >= max_det { break; }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn det(class_id: i32, conf: f32, cx: f32) -> Detection {
        Detection { class_id, conf, cx, cy: 0.5, w: 0.1, h: 0.3 }
    }

    struct Canned(Vec<Detection>);

    impl Detector for Canned {
        fn name(&self) -> &'static str { "canned" }
        fn detect(&mut self, _frame: &Frame, _conf_th: f32) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_person_filter_keeps_target_class_above_threshold() {
        let canned = Canned(vec![
            det(0, 0.9, 0.1),
            det(0, 0.39, 0.2),
            det(2, 0.95, 0.3),
            det(0, 0.4, 0.4),
        ]);
        let mut pd = PersonDetector::new(canned, 0);
        let frame = Frame::from_rgb(RgbImage::new(32, 32));
        let set = pd.detect(&frame, 0.4).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.boxes.iter().all(|d| d.class_id == 0 && d.conf >= 0.4));
    }

    #[test]
    fn test_empty_frame_is_an_error() {
        let mut pd = PersonDetector::new(Canned(vec![]), 0);
        let frame = Frame::from_rgb(RgbImage::new(0, 0));
        assert!(pd.detect(&frame, 0.4).is_err());
    }

    #[test]
    fn test_target_class_lookup() {
        let cfg: VisionConfig = toml::from_str(
            r#"
            backend = "onnx"
            model_path = "yolov8s.onnx"
            img_w = 640
            img_h = 640
            num_classes = 3
            class_names = ["person", "bicycle", "car"]
            nms_iou_threshold = 0.45
            max_detections = 300
            output_layout = "yolov8"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.target_class, "person");
        assert_eq!(cfg.target_class_id().unwrap(), 0);

        let other = VisionConfig { target_class: "dog".into(), ..cfg };
        assert!(other.target_class_id().is_err());
    }

    #[test]
    fn test_yolov8_decode_channel_major() {
        // two predictions, two classes: layout [cx.., cy.., w.., h.., c0.., c1..]
        let raw = vec![
            320.0, 64.0, // cx
            320.0, 64.0, // cy
            64.0, 32.0, // w
            128.0, 32.0, // h
            0.8, 0.1, // class 0
            0.1, 0.3, // class 1
        ];
        let dets = postprocess_yolov8(&raw, 2, 2, 0.25, 640, 640);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_id, 0);
        assert!((dets[0].cx - 0.5).abs() < 1e-6);
        assert!((dets[0].h - 0.2).abs() < 1e-6);
        assert_eq!(dets[1].class_id, 1);

        assert!(postprocess_yolov8(&raw, 2, 2, 0.5, 640, 640).len() == 1);
        assert!(postprocess_yolov8(&raw[..5], 2, 2, 0.25, 640, 640).is_empty());
    }

    #[test]
    fn test_ultralytics_decode_uses_objectness() {
        let raw = vec![
            0.5, 0.5, 0.2, 0.4, 0.9, 0.8, 0.1,
            0.2, 0.2, 0.1, 0.1, 0.2, 0.9, 0.1,
        ];
        let dets = postprocess_ultralytics(&raw, 2, 2, 0.4);
        assert_eq!(dets.len(), 1);
        assert!((dets[0].conf - 0.72).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlaps_per_class() {
        let dets = vec![
            det(0, 0.9, 0.50),
            det(0, 0.8, 0.51),
            det(1, 0.7, 0.50),
            det(0, 0.6, 0.90),
        ];
        let kept = nms_filter(dets, 0.5, 10);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].conf, 0.9);

        let capped = nms_filter(vec![det(0, 0.9, 0.1), det(0, 0.8, 0.5), det(0, 0.7, 0.9)], 0.5, 2);
        assert_eq!(capped.len(), 2);
    }
}
