use std::{path::PathBuf, sync::{Arc, Mutex}};

use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{inputs, GraphOptimizationLevel, Session, SessionOutputs};

use crate::{domain::face::{FaceBBox, FaceLandmarks}, error::{Error, SvResult}, tools::log::{log_error, LogServiceType}};

/// Length of the face embedding vectors produced by the recognition model.
pub const EMBEDDING_DIM: usize = 512;

/// Pipeline tag persisted with every face record so embeddings from
/// different model combinations are never compared blindly.
pub const MODEL_VERSION: &str = "RetinaFace-ArcFace512-v1";

const DETECTION_CONFIDENCE: f32 = 0.5;
const NMS_IOU: f32 = 0.4;
/// Minimum IoU for pairing an alignment-pass box with a detection-pass box.
const LANDMARK_MATCH_IOU: f32 = 0.3;
const CROP_MARGIN: f32 = 0.1;
const EMBED_INPUT_SIZE: u32 = 112;

const LANDMARK_NAMES: [&str; 5] = ["left_eye", "right_eye", "nose", "mouth_left", "mouth_right"];

/// One face as reported by the analyzer. The embedding is optional: a face
/// the recognition model could not embed is still reported (and skipped with
/// a log by the pipeline).
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub embedding: Option<Vec<f32>>,
    pub bbox: FaceBBox,
    pub confidence: f32,
    pub landmarks: FaceLandmarks,
}

/// External detection/alignment/embedding collaborator. Everything past this
/// trait is a black box to the matching core; tests script it.
#[async_trait]
pub trait FaceAnalyzer: Send + Sync {
    /// Analyze one encoded image. An image with no faces yields an empty
    /// list, never an error.
    async fn analyze(&self, image: Vec<u8>) -> SvResult<Vec<DetectedFace>>;
}

struct LoadedSessions {
    detection: Session,
    alignment: Option<Session>,
    recognition: Session,
}

/// ONNX-backed analyzer: RetinaFace detection, optional landmark/alignment
/// model, ArcFace 512-d embeddings. Sessions are loaded lazily on first use
/// and kept for the process lifetime.
pub struct OnnxFaceAnalyzer {
    models_dir: PathBuf,
    sessions: Mutex<Option<Arc<LoadedSessions>>>,
}

impl OnnxFaceAnalyzer {
    pub fn new(models_dir: PathBuf) -> Self {
        OnnxFaceAnalyzer {
            models_dir,
            sessions: Mutex::new(None),
        }
    }

    fn load_session(path: &PathBuf) -> SvResult<Session> {
        Ok(Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)?)
    }

    fn sessions(&self) -> SvResult<Arc<LoadedSessions>> {
        let mut guard = self.sessions.lock().map_err(|_| Error::Error { message: "analyzer session lock poisoned".to_string() })?;
        if let Some(sessions) = &*guard {
            return Ok(sessions.clone());
        }
        let detection_path = self.models_dir.join("retinaface.onnx");
        let recognition_path = self.models_dir.join("arcface.onnx");
        if !detection_path.exists() || !recognition_path.exists() {
            return Err(Error::NoModelFound);
        }
        let detection = Self::load_session(&detection_path)?;
        let recognition = Self::load_session(&recognition_path)?;
        let alignment_path = self.models_dir.join("landmark.onnx");
        let alignment = if alignment_path.exists() {
            Some(Self::load_session(&alignment_path)?)
        } else {
            None
        };
        let sessions = Arc::new(LoadedSessions {
            detection,
            alignment,
            recognition,
        });
        *guard = Some(sessions.clone());
        Ok(sessions)
    }
}

#[async_trait]
impl FaceAnalyzer for OnnxFaceAnalyzer {
    async fn analyze(&self, image: Vec<u8>) -> SvResult<Vec<DetectedFace>> {
        let sessions = self.sessions()?;
        tokio::task::spawn_blocking(move || analyze_blocking(&sessions, &image))
            .await
            .map_err(|_| Error::Error { message: "analyzer task aborted".to_string() })?
    }
}

fn analyze_blocking(sessions: &LoadedSessions, buffer: &[u8]) -> SvResult<Vec<DetectedFace>> {
    let img = image::load_from_memory(buffer)?;

    let detections = match run_detection(&sessions.detection, &img) {
        Ok(detections) => detections,
        Err(error) => {
            // detection failure is "zero faces", never fatal
            log_error(LogServiceType::Recognition, format!("Face detection failed: {:#}", error));
            return Ok(vec![]);
        }
    };
    if detections.is_empty() {
        return Ok(vec![]);
    }

    let mut faces: Vec<DetectedFace> = detections
        .iter()
        .map(|d| DetectedFace {
            embedding: None,
            bbox: d.bbox,
            confidence: d.confidence,
            landmarks: FaceLandmarks::new(),
        })
        .collect();

    // Second pass: landmark extraction, best-effort. Boxes are paired with
    // the detection pass by IoU, not list position, so a reordered output
    // cannot attach landmarks to the wrong face.
    if let Some(alignment) = &sessions.alignment {
        match run_alignment(alignment, &img) {
            Ok(aligned) => merge_landmarks_by_iou(&mut faces, aligned, LANDMARK_MATCH_IOU),
            Err(error) => {
                log_error(LogServiceType::Recognition, format!("Landmark extraction failed, keeping detections without landmarks: {:#}", error));
            }
        }
    }

    for face in faces.iter_mut() {
        match embed_face(&sessions.recognition, &img, &face.bbox) {
            Ok(embedding) => face.embedding = Some(embedding),
            Err(error) => {
                log_error(LogServiceType::Recognition, format!("Embedding extraction failed for face at {:?}: {:#}", face.bbox, error));
            }
        }
    }

    Ok(faces)
}

#[derive(Debug, Clone)]
struct RawDetection {
    bbox: FaceBBox,
    confidence: f32,
}

#[derive(Debug, Clone)]
pub struct AlignedFace {
    pub bbox: FaceBBox,
    pub landmarks: FaceLandmarks,
}

fn image_tensor(img: &DynamicImage) -> SvResult<Array4<f32>> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let data: Vec<f32> = rgb.pixels().flat_map(|p| [p[0] as f32 / 255.0, p[1] as f32 / 255.0, p[2] as f32 / 255.0]).collect();
    let nhwc = Array4::from_shape_vec((1usize, height as usize, width as usize, 3usize), data)?;
    Ok(nhwc)
}

/// Detection model contract: rows of `[x1, y1, x2, y2, score]`, coordinates
/// normalized to [0, 1].
fn run_detection(session: &Session, img: &DynamicImage) -> SvResult<Vec<RawDetection>> {
    let (width, height) = img.dimensions();
    let input = image_tensor(img)?;
    let input_name = session.inputs.first().map(|i| i.name.to_string()).ok_or(Error::Error { message: "Detection model has no inputs".to_string() })?;
    let outputs: SessionOutputs = session.run(inputs![input_name => input.view()]?)?;
    let output_name = session.outputs.first().map(|o| o.name.to_string()).ok_or(Error::Error { message: "Detection model has no outputs".to_string() })?;
    let tensor = outputs[output_name].try_extract_tensor::<f32>()?;
    let values: Vec<f32> = tensor.view().iter().copied().collect();

    let detections = decode_detection_rows(&values, width as f32, height as f32);
    Ok(non_max_suppression(detections, NMS_IOU))
}

/// Alignment model contract: rows of `[x1, y1, x2, y2, score, 5 x (lx, ly)]`.
fn run_alignment(session: &Session, img: &DynamicImage) -> SvResult<Vec<AlignedFace>> {
    let (width, height) = img.dimensions();
    let input = image_tensor(img)?;
    let input_name = session.inputs.first().map(|i| i.name.to_string()).ok_or(Error::Error { message: "Alignment model has no inputs".to_string() })?;
    let outputs: SessionOutputs = session.run(inputs![input_name => input.view()]?)?;
    let output_name = session.outputs.first().map(|o| o.name.to_string()).ok_or(Error::Error { message: "Alignment model has no outputs".to_string() })?;
    let tensor = outputs[output_name].try_extract_tensor::<f32>()?;
    let values: Vec<f32> = tensor.view().iter().copied().collect();

    Ok(decode_alignment_rows(&values, width as f32, height as f32))
}

fn decode_detection_rows(values: &[f32], width: f32, height: f32) -> Vec<RawDetection> {
    let mut detections = Vec::new();
    for row in values.chunks_exact(5) {
        let confidence = row[4];
        if confidence <= DETECTION_CONFIDENCE {
            continue;
        }
        detections.push(RawDetection {
            bbox: FaceBBox {
                x: row[0] * width,
                y: row[1] * height,
                width: (row[2] - row[0]) * width,
                height: (row[3] - row[1]) * height,
            },
            confidence,
        });
    }
    detections
}

fn decode_alignment_rows(values: &[f32], width: f32, height: f32) -> Vec<AlignedFace> {
    let mut faces = Vec::new();
    for row in values.chunks_exact(15) {
        if row[4] <= DETECTION_CONFIDENCE {
            continue;
        }
        let mut landmarks = FaceLandmarks::new();
        for (i, name) in LANDMARK_NAMES.iter().enumerate() {
            landmarks.insert(name.to_string(), (row[5 + i * 2] * width, row[6 + i * 2] * height));
        }
        faces.push(AlignedFace {
            bbox: FaceBBox {
                x: row[0] * width,
                y: row[1] * height,
                width: (row[2] - row[0]) * width,
                height: (row[3] - row[1]) * height,
            },
            landmarks,
        });
    }
    faces
}

fn non_max_suppression(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<RawDetection> = Vec::new();
    for detection in detections {
        if kept.iter().all(|k| k.bbox.iou(&detection.bbox) <= iou_threshold) {
            kept.push(detection);
        }
    }
    kept
}

/// Attach landmarks from an alignment pass to detection-pass faces. Each
/// aligned box goes to the not-yet-matched detection with the highest IoU,
/// and only when that IoU clears `min_iou`; leftovers on either side keep
/// their state (faces without landmarks stay landmark-less).
pub fn merge_landmarks_by_iou(faces: &mut [DetectedFace], aligned: Vec<AlignedFace>, min_iou: f32) {
    let mut taken = vec![false; faces.len()];
    for aligned_face in aligned {
        let mut best: Option<(usize, f32)> = None;
        for (i, face) in faces.iter().enumerate() {
            if taken[i] {
                continue;
            }
            let iou = face.bbox.iou(&aligned_face.bbox);
            if iou >= min_iou && best.map(|(_, b)| iou > b).unwrap_or(true) {
                best = Some((i, iou));
            }
        }
        if let Some((i, _)) = best {
            taken[i] = true;
            faces[i].landmarks = aligned_face.landmarks;
        }
    }
}

fn embed_face(session: &Session, img: &DynamicImage, bbox: &FaceBBox) -> SvResult<Vec<f32>> {
    let (width, height) = img.dimensions();

    let margin_x = bbox.width * CROP_MARGIN;
    let margin_y = bbox.height * CROP_MARGIN;
    let x = (bbox.x - margin_x).max(0.0) as u32;
    let y = (bbox.y - margin_y).max(0.0) as u32;
    let w = ((bbox.width + 2.0 * margin_x) as u32).max(1).min(width.saturating_sub(x).max(1));
    let h = ((bbox.height + 2.0 * margin_y) as u32).max(1).min(height.saturating_sub(y).max(1));

    let crop = img.crop_imm(x, y, w, h).resize_exact(EMBED_INPUT_SIZE, EMBED_INPUT_SIZE, FilterType::Lanczos3);
    let rgb = crop.to_rgb8();
    let data: Vec<f32> = rgb.iter().map(|&v| (v as f32 - 127.0) / 128.0).collect();
    let input = Array4::from_shape_vec((1usize, EMBED_INPUT_SIZE as usize, EMBED_INPUT_SIZE as usize, 3usize), data)?;

    let input_name = session.inputs.first().map(|i| i.name.to_string()).ok_or(Error::Error { message: "Recognition model has no inputs".to_string() })?;
    let outputs: SessionOutputs = session.run(inputs![input_name => input.view()]?)?;
    let output_name = session.outputs.first().map(|o| o.name.to_string()).ok_or(Error::Error { message: "Recognition model has no outputs".to_string() })?;
    let tensor = outputs[output_name].try_extract_tensor::<f32>()?;
    let embedding: Vec<f32> = tensor.view().iter().copied().collect();

    if embedding.len() != EMBEDDING_DIM {
        return Err(Error::Error { message: format!("Recognition model returned {} values, expected {}", embedding.len(), EMBEDDING_DIM) });
    }
    Ok(embedding)
}

/// Scripted analyzer for tests: responses are keyed by the exact image bytes
/// so concurrent pipeline runs stay deterministic.
#[cfg(test)]
pub mod test_analyzer {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::{Error, SvResult};

    use super::{DetectedFace, FaceAnalyzer};

    #[derive(Debug, Clone)]
    pub enum Script {
        Faces(Vec<DetectedFace>),
        Fail(String),
        Hang,
    }

    pub struct ScriptedAnalyzer {
        by_image: Mutex<HashMap<Vec<u8>, Script>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedAnalyzer {
        pub fn new() -> Self {
            ScriptedAnalyzer {
                by_image: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn script_for(&self, image: &[u8], script: Script) {
            self.by_image.lock().unwrap().insert(image.to_vec(), script);
        }
    }

    #[async_trait]
    impl FaceAnalyzer for ScriptedAnalyzer {
        async fn analyze(&self, image: Vec<u8>) -> SvResult<Vec<DetectedFace>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let script = self.by_image.lock().unwrap().get(&image).cloned();
            match script {
                Some(Script::Faces(faces)) => Ok(faces),
                Some(Script::Fail(message)) => Err(Error::Error { message }),
                Some(Script::Hang) => {
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                    Ok(vec![])
                }
                None => Ok(vec![]),
            }
        }
    }
}
