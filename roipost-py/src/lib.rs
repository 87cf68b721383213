//! Python bindings for the roipost detection post-processor.
//!
//! Arrays are taken as contiguous `float32` numpy arrays and results are
//! returned as lists of `Detection` objects.

use numpy::{PyReadonlyArray1, PyReadonlyArray2, PyUntypedArrayMethods};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use roipost::lowlevel::{DEFAULT_XFORM_CLIP, LABELS};
use roipost::{
    suppress, BBox, BoxCollection, Candidate, CodingWeights, DeltaLayout, HeadOutputs,
    ImageProposals, ImageShape, PostProcessConfig as RustPostProcessConfig,
    PostProcessor as RustPostProcessor, RoiPostError,
};

/// Convert a RoiPostError to a Python exception.
fn to_py_err(err: RoiPostError) -> PyErr {
    match err {
        RoiPostError::MissingField { .. } | RoiPostError::FieldMismatch { .. } => {
            PyRuntimeError::new_err(err.to_string())
        }
        _ => PyValueError::new_err(err.to_string()),
    }
}

/// Reads an `[n, 4]` float32 array into boxes.
fn boxes_from_array(array: &PyReadonlyArray2<'_, f32>) -> PyResult<Vec<BBox>> {
    let shape = array.shape();
    if shape[1] != 4 && shape[0] != 0 {
        return Err(PyValueError::new_err("boxes must have shape (n, 4)"));
    }
    Ok(array
        .as_slice()?
        .chunks_exact(4)
        .map(|c| BBox::new(c[0], c[1], c[2], c[3]))
        .collect())
}

/// A single detection.
#[pyclass]
#[derive(Clone)]
pub struct Detection {
    #[pyo3(get)]
    pub x1: f32,
    #[pyo3(get)]
    pub y1: f32,
    #[pyo3(get)]
    pub x2: f32,
    #[pyo3(get)]
    pub y2: f32,
    /// Class probability.
    #[pyo3(get)]
    pub score: f32,
    /// Class label (0 only appears in deferred, unfiltered output).
    #[pyo3(get)]
    pub label: i64,
}

#[pymethods]
impl Detection {
    fn __repr__(&self) -> String {
        format!(
            "Detection(box=({:.1}, {:.1}, {:.1}, {:.1}), score={:.4}, label={})",
            self.x1, self.y1, self.x2, self.y2, self.score, self.label
        )
    }
}

fn collection_to_detections(
    collection: &BoxCollection,
    num_classes: usize,
) -> PyResult<Vec<Detection>> {
    let scores = collection.scores().map_err(to_py_err)?;
    let labels: Vec<i64> = if collection.has_field(LABELS) {
        collection.labels().map_err(to_py_err)?.to_vec()
    } else {
        (0..collection.len())
            .map(|i| (i % num_classes) as i64)
            .collect()
    };
    Ok(collection
        .boxes()
        .iter()
        .zip(scores)
        .zip(labels)
        .map(|((b, &score), label)| Detection {
            x1: b.x1,
            y1: b.y1,
            x2: b.x2,
            y2: b.y2,
            score,
            label,
        })
        .collect())
}

/// Configuration for the post-processor.
#[pyclass]
#[derive(Clone)]
pub struct PostProcessConfig {
    inner: RustPostProcessConfig,
}

#[pymethods]
impl PostProcessConfig {
    /// Create a new PostProcessConfig.
    ///
    /// Args:
    ///     score_thresh: Minimum class probability, exclusive (default: 0.05)
    ///     nms_iou: Per-class NMS IoU threshold (default: 0.5)
    ///     detections_per_img: Per-image cap, <= 0 disables (default: 100)
    ///     coding_weights: (wx, wy, ww, wh) delta weights (default: (10, 10, 5, 5))
    ///     bbox_xform_clip: Clamp on scaled size deltas (default: log(1000 / 16))
    ///     class_agnostic: One shared delta per proposal (default: False)
    ///     defer_filtering: Skip NMS and the cap (default: False)
    ///     remove_empty: Drop boxes left empty by clipping (default: False)
    ///     parallel: Process images in parallel (default: False)
    #[new]
    #[pyo3(signature = (
        score_thresh = 0.05,
        nms_iou = 0.5,
        detections_per_img = 100,
        coding_weights = (10.0, 10.0, 5.0, 5.0),
        bbox_xform_clip = DEFAULT_XFORM_CLIP,
        class_agnostic = false,
        defer_filtering = false,
        remove_empty = false,
        parallel = false
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        score_thresh: f32,
        nms_iou: f32,
        detections_per_img: i64,
        coding_weights: (f32, f32, f32, f32),
        bbox_xform_clip: f32,
        class_agnostic: bool,
        defer_filtering: bool,
        remove_empty: bool,
        parallel: bool,
    ) -> PyResult<Self> {
        let (wx, wy, ww, wh) = coding_weights;
        let inner = RustPostProcessConfig {
            score_thresh,
            nms_iou,
            detections_per_img,
            coding_weights: CodingWeights { wx, wy, ww, wh },
            bbox_xform_clip,
            delta_layout: if class_agnostic {
                DeltaLayout::Shared
            } else {
                DeltaLayout::PerClass
            },
            defer_filtering,
            remove_empty,
            parallel,
        };
        inner.validate().map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Validate the configuration.
    fn validate(&self) -> PyResult<()> {
        self.inner.validate().map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "PostProcessConfig(score_thresh={}, nms_iou={}, detections_per_img={}, class_agnostic={}, defer_filtering={})",
            self.inner.score_thresh,
            self.inner.nms_iou,
            self.inner.detections_per_img,
            self.inner.delta_layout == DeltaLayout::Shared,
            self.inner.defer_filtering
        )
    }
}

/// Box-head post-processor.
#[pyclass]
pub struct PostProcessor {
    inner: RustPostProcessor,
}

#[pymethods]
impl PostProcessor {
    /// Create a post-processor.
    ///
    /// Args:
    ///     config: PostProcessConfig (default: PostProcessConfig())
    #[new]
    #[pyo3(signature = (config = None))]
    fn new(config: Option<PostProcessConfig>) -> PyResult<Self> {
        let cfg = config.map(|c| c.inner).unwrap_or_default();
        let inner = RustPostProcessor::new(cfg).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Post-process a batch.
    ///
    /// Args:
    ///     class_logits: float32 array (N, C) of raw class scores
    ///     box_deltas: float32 array (N, 4C), or (N, 4) when class-agnostic
    ///     proposals: list of float32 arrays (n_i, 4), one per image
    ///     image_sizes: list of (width, height), one per image
    ///
    /// Returns:
    ///     One list of Detection per image, in input order
    fn process<'py>(
        &self,
        class_logits: PyReadonlyArray2<'py, f32>,
        box_deltas: PyReadonlyArray2<'py, f32>,
        proposals: Vec<PyReadonlyArray2<'py, f32>>,
        image_sizes: Vec<(u32, u32)>,
    ) -> PyResult<Vec<Vec<Detection>>> {
        if proposals.len() != image_sizes.len() {
            return Err(PyValueError::new_err(
                "proposals and image_sizes must have the same length",
            ));
        }
        let num_classes = class_logits.shape()[1];
        let images = proposals
            .iter()
            .zip(image_sizes)
            .map(|(boxes, (width, height))| {
                let shape = ImageShape::new(width, height).map_err(to_py_err)?;
                Ok(ImageProposals::new(boxes_from_array(boxes)?, shape))
            })
            .collect::<PyResult<Vec<_>>>()?;

        let head = HeadOutputs::new(class_logits.as_slice()?, box_deltas.as_slice()?, num_classes);
        let results = self.inner.process(head, &images).map_err(to_py_err)?;
        results
            .iter()
            .map(|c| collection_to_detections(c, num_classes))
            .collect()
    }

    fn __repr__(&self) -> String {
        let cfg = self.inner.config();
        format!(
            "PostProcessor(score_thresh={}, nms_iou={}, detections_per_img={})",
            cfg.score_thresh, cfg.nms_iou, cfg.detections_per_img
        )
    }
}

/// Greedy NMS over a single set of boxes.
///
/// Args:
///     boxes: float32 array (n, 4) of (x1, y1, x2, y2)
///     scores: float32 array (n,)
///     iou_threshold: IoU above which lower-scoring boxes are dropped
///
/// Returns:
///     Indices of kept boxes, highest score first
#[pyfunction]
#[pyo3(signature = (boxes, scores, iou_threshold = 0.5))]
fn nms(
    boxes: PyReadonlyArray2<'_, f32>,
    scores: PyReadonlyArray1<'_, f32>,
    iou_threshold: f32,
) -> PyResult<Vec<usize>> {
    let boxes = boxes_from_array(&boxes)?;
    let scores = scores.as_slice()?;
    if boxes.len() != scores.len() {
        return Err(PyValueError::new_err("boxes and scores must have the same length"));
    }
    let candidates: Vec<Candidate> = boxes
        .into_iter()
        .zip(scores)
        .enumerate()
        .map(|(index, (bbox, &score))| Candidate { bbox, score, index })
        .collect();
    Ok(suppress(&candidates, iou_threshold))
}

/// Python module for roipost.
#[pymodule]
fn _roipost(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Detection>()?;
    m.add_class::<PostProcessConfig>()?;
    m.add_class::<PostProcessor>()?;
    m.add_function(wrap_pyfunction!(nms, m)?)?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
