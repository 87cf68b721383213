use clap::Parser;
use roipost::lowlevel::{DEFAULT_XFORM_CLIP, LABELS};
use roipost::{
    BBox, BoxCollection, CodingWeights, DeltaLayout, HeadOutputs, ImageProposals, ImageShape,
    PostProcessConfig, PostProcessor, RoiPostError, RoiPostResult,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "roipost CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PostProcessConfigJson {
    score_thresh: f32,
    nms_iou: f32,
    detections_per_img: i64,
    coding_weights: [f32; 4],
    bbox_xform_clip: f32,
    class_agnostic: bool,
    defer_filtering: bool,
    remove_empty: bool,
    parallel: bool,
}

impl Default for PostProcessConfigJson {
    fn default() -> Self {
        let cfg = PostProcessConfig::default();
        let w = cfg.coding_weights;
        Self {
            score_thresh: cfg.score_thresh,
            nms_iou: cfg.nms_iou,
            detections_per_img: cfg.detections_per_img,
            coding_weights: [w.wx, w.wy, w.ww, w.wh],
            bbox_xform_clip: DEFAULT_XFORM_CLIP,
            class_agnostic: false,
            defer_filtering: cfg.defer_filtering,
            remove_empty: cfg.remove_empty,
            parallel: cfg.parallel,
        }
    }
}

impl From<PostProcessConfigJson> for PostProcessConfig {
    fn from(value: PostProcessConfigJson) -> Self {
        let [wx, wy, ww, wh] = value.coding_weights;
        Self {
            score_thresh: value.score_thresh,
            nms_iou: value.nms_iou,
            detections_per_img: value.detections_per_img,
            coding_weights: CodingWeights { wx, wy, ww, wh },
            bbox_xform_clip: value.bbox_xform_clip,
            delta_layout: if value.class_agnostic {
                DeltaLayout::Shared
            } else {
                DeltaLayout::PerClass
            },
            defer_filtering: value.defer_filtering,
            remove_empty: value.remove_empty,
            parallel: value.parallel,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Config {
    input_path: String,
    output_path: Option<String>,
    postprocess: PostProcessConfigJson,
}

#[derive(Debug, Deserialize)]
struct ImageJson {
    width: u32,
    height: u32,
    boxes: Vec<[f32; 4]>,
}

#[derive(Debug, Deserialize)]
struct Input {
    num_classes: usize,
    class_logits: Vec<Vec<f32>>,
    box_deltas: Vec<Vec<f32>>,
    images: Vec<ImageJson>,
}

#[derive(Debug, Serialize)]
struct DetectionRecord {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    label: i64,
}

#[derive(Debug, Serialize)]
struct ImageRecord {
    detections: Vec<DetectionRecord>,
}

#[derive(Debug, Serialize)]
struct Output {
    images: Vec<ImageRecord>,
}

fn image_record(
    collection: &BoxCollection,
    num_classes: usize,
) -> Result<ImageRecord, Box<dyn std::error::Error>> {
    let boxes = collection.boxes();
    let scores = collection.scores()?;
    // Deferred output has no labels; its boxes are laid out proposal-major.
    let labels: Vec<i64> = if collection.has_field(LABELS) {
        collection.labels()?.to_vec()
    } else {
        (0..boxes.len()).map(|i| (i % num_classes) as i64).collect()
    };
    let detections = boxes
        .iter()
        .zip(scores)
        .zip(labels)
        .map(|((b, &score), label)| DetectionRecord {
            x1: b.x1,
            y1: b.y1,
            x2: b.x2,
            y2: b.y2,
            score,
            label,
        })
        .collect();
    Ok(ImageRecord { detections })
}

/// Flattens row-major JSON rows, rejecting any row that is not `width` wide.
fn flatten_rows(rows: &[Vec<f32>], width: usize, what: &'static str) -> RoiPostResult<Vec<f32>> {
    if let Some(row) = rows.iter().find(|row| row.len() != width) {
        return Err(RoiPostError::ShapeMismatch {
            what,
            expected: width,
            got: row.len(),
        });
    }
    Ok(rows.concat())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("roipost=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.input_path.is_empty() {
        return Err("input_path must be set in the config".into());
    }

    let input_text = fs::read_to_string(&config.input_path)?;
    let input: Input = serde_json::from_str(&input_text)?;
    if input.num_classes == 0 {
        return Err("num_classes must be at least 1".into());
    }

    let proposals = input
        .images
        .iter()
        .map(|img| {
            let shape = ImageShape::new(img.width, img.height)?;
            let boxes = img
                .boxes
                .iter()
                .map(|&[x1, y1, x2, y2]| BBox::new(x1, y1, x2, y2))
                .collect();
            Ok(ImageProposals::new(boxes, shape))
        })
        .collect::<RoiPostResult<Vec<_>>>()?;
    let delta_width = if config.postprocess.class_agnostic {
        4
    } else {
        4 * input.num_classes
    };
    let logits = flatten_rows(&input.class_logits, input.num_classes, "class logits row")?;
    let deltas = flatten_rows(&input.box_deltas, delta_width, "box deltas row")?;

    let processor = PostProcessor::new(config.postprocess.into())?;
    let results = processor.process(
        HeadOutputs::new(&logits, &deltas, input.num_classes),
        &proposals,
    )?;

    let images = results
        .iter()
        .map(|collection| image_record(collection, input.num_classes))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(
        images = images.len(),
        detections = images.iter().map(|i| i.detections.len()).sum::<usize>(),
        "post-processing finished"
    );

    let json = serde_json::to_string_pretty(&Output { images })?;
    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::flatten_rows;
    use roipost::RoiPostError;

    #[test]
    fn ragged_rows_are_rejected() {
        // Same total length as two rows of two.
        let rows = vec![vec![0.1, 0.2, 0.3], vec![0.4]];
        let err = flatten_rows(&rows, 2, "class logits row").unwrap_err();
        assert_eq!(
            err,
            RoiPostError::ShapeMismatch {
                what: "class logits row",
                expected: 2,
                got: 3,
            }
        );
    }

    #[test]
    fn uniform_rows_flatten_in_order() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert_eq!(
            flatten_rows(&rows, 2, "class logits row").unwrap(),
            vec![1.0, 2.0, 3.0, 4.0]
        );
        assert!(flatten_rows(&[], 2, "class logits row").unwrap().is_empty());
    }
}
