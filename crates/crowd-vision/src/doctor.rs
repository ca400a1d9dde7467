use anyhow::Result;
use std::path::Path;
use tracing::warn;

use crate::camera::CameraConfig;
use crate::VisionConfig;

pub fn check_camera(cfg: &CameraConfig) -> Result<()> {
    match cfg.mode.as_str() {
        "replay" => {
            let dir = cfg.replay_dir.as_deref().unwrap_or_default();
            anyhow::ensure!(!dir.is_empty(), "camera.replay_dir missing for mode=replay");
            anyhow::ensure!(Path::new(dir).is_dir(), "camera.replay_dir is not a dir: {}", dir);
        }
        "v4l2-mjpeg" => {
            if !Path::new(&cfg.device).exists() {
                warn!("doctor: camera.device {} not present right now", cfg.device);
            }
        }
        "libcamera-jpeg" => {}
        other => anyhow::bail!("unknown camera.mode: {}", other),
    }
    anyhow::ensure!(cfg.width > 0 && cfg.height > 0, "camera.width/height must be > 0");
    Ok(())
}

pub fn check_model(cfg: &VisionConfig) -> Result<()> {
    anyhow::ensure!(
        matches!(cfg.backend.as_str(), "onnx" | "tflite"),
        "unknown vision.backend: {}",
        cfg.backend
    );
    anyhow::ensure!(Path::new(&cfg.model_path).is_file(), "vision.model_path not found: {}", cfg.model_path);
    anyhow::ensure!(cfg.class_names.len() == cfg.num_classes, "vision.class_names has {} entries, num_classes={}", cfg.class_names.len(), cfg.num_classes);
    anyhow::ensure!(cfg.nms_iou_threshold > 0.0 && cfg.nms_iou_threshold <= 1.0, "vision.nms_iou_threshold out of range");
    anyhow::ensure!(cfg.max_detections > 0, "vision.max_detections must be > 0");
    cfg.target_class_id()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vision(model_path: &str) -> VisionConfig {
        VisionConfig {
            backend: "onnx".into(),
            model_path: model_path.into(),
            img_w: 640,
            img_h: 640,
            num_classes: 2,
            class_names: vec!["person".into(), "bicycle".into()],
            target_class: "person".into(),
            nms_iou_threshold: 0.45,
            max_detections: 300,
            output_layout: "yolov8".into(),
        }
    }

    #[test]
    fn test_model_checks() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let path = f.path().to_str().unwrap();
        assert!(check_model(&vision(path)).is_ok());
        assert!(check_model(&vision("/nonexistent/yolov8s.onnx")).is_err());

        let mut bad = vision(path);
        bad.num_classes = 80;
        assert!(check_model(&bad).is_err());

        let mut bad = vision(path);
        bad.backend = "torch".into();
        assert!(check_model(&bad).is_err());
    }

    #[test]
    fn test_camera_checks() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg: CameraConfig = toml::from_str(r#"mode = "replay""#).unwrap();
        assert!(check_camera(&cfg).is_err());
        cfg.replay_dir = Some(dir.path().to_string_lossy().into_owned());
        assert!(check_camera(&cfg).is_ok());

        cfg.mode = "v4l2-mjpeg".into();
        cfg.device = "/dev/does-not-exist".into();
        assert!(check_camera(&cfg).is_ok());

        cfg.mode = "usb".into();
        assert!(check_camera(&cfg).is_err());
    }
}
