//! Translation of clip operations into ffmpeg filtergraphs.

use std::path::Path;

use reelsmith_project_model::{Clip, ClipOp, Edge, FrameSize, RampDirection, SegmentKind};

/// Label of the finished video stream in a segment graph.
pub const SEGMENT_OUTPUT_LABEL: &str = "[v]";

/// Input options that bring the clip's source span into the graph.
pub fn segment_input_args(clip: &Clip, fps: u32) -> Vec<String> {
    match clip.source.kind() {
        SegmentKind::Image => vec![
            "-loop".to_string(),
            "1".to_string(),
            "-framerate".to_string(),
            fps.to_string(),
            "-t".to_string(),
            format!("{:.3}", clip.duration),
        ],
        SegmentKind::Video => vec![
            "-ss".to_string(),
            format!("{:.3}", clip.start),
            "-t".to_string(),
            format!("{:.3}", clip.duration),
        ],
    }
}

/// Filtergraph realizing `clip` from input 0, ending in [`SEGMENT_OUTPUT_LABEL`].
///
/// Slides are composited over a black canvas with `overlay`; every other
/// operation is a plain filter in the chain.
pub fn segment_filter_graph(clip: &Clip, fps: u32) -> String {
    let frames = (clip.duration * fps as f64).round().max(1.0) as u64;
    let mut chain = Vec::new();
    let mut size = clip.source.natural_size();
    let mut slide = None;

    for op in &clip.ops {
        match op {
            ClipOp::ZoomIn { rate } => {
                chain.push(zoom_in_filter(*rate, frames, size, clip.size, fps));
            }
            ClipOp::Scale { size: target } => {
                chain.push(format!("scale={}:{},setsar=1", target.width, target.height));
                size = *target;
            }
            ClipOp::Letterbox { canvas, content } => {
                chain.push(letterbox_filter(*canvas, *content));
                size = *canvas;
            }
            ClipOp::Fade {
                direction,
                duration,
            } => chain.push(fade_filter(*direction, *duration, clip.duration)),
            ClipOp::Slide {
                direction,
                edge,
                duration,
            } => slide = Some((*direction, *edge, *duration)),
        }
    }

    chain.push(format!("fps={fps}"));
    chain.push("format=yuv420p".to_string());
    let chain = chain.join(",");

    match slide {
        None => format!("[0:v]{chain}{SEGMENT_OUTPUT_LABEL}"),
        Some((direction, edge, duration)) => {
            let (x, y) = slide_position(direction, edge, duration, clip.duration, clip.size);
            format!(
                "color=c=black:s={}x{}:r={fps}:d={:.3}[bg];[0:v]{chain}[fg];\
                 [bg][fg]overlay=x='{x}':y='{y}':eval=frame:shortest=1,format=yuv420p{SEGMENT_OUTPUT_LABEL}",
                clip.size.width, clip.size.height, clip.duration,
            )
        }
    }
}

/// Slow centered zoom: scale grows linearly from 1 to `1 + rate`.
fn zoom_in_filter(rate: f64, frames: u64, size: FrameSize, fallback: FrameSize, fps: u32) -> String {
    let out = if size.is_known() { size } else { fallback };
    format!(
        "zoompan=z='1+{rate:.5}*on/{frames}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={}x{}:fps={fps}",
        out.width, out.height,
    )
}

fn letterbox_filter(canvas: FrameSize, content: Option<FrameSize>) -> String {
    let (w, h) = (canvas.width, canvas.height);
    let scale = match content {
        Some(c) => format!("scale={}:{}", c.width, c.height),
        None => format!("scale={w}:{h}:force_original_aspect_ratio=decrease"),
    };
    format!("{scale},pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1")
}

fn fade_filter(direction: RampDirection, duration: f64, clip_duration: f64) -> String {
    match direction {
        RampDirection::In => format!("fade=t=in:st=0:d={duration:.3}"),
        RampDirection::Out => format!(
            "fade=t=out:st={:.3}:d={duration:.3}",
            (clip_duration - duration).max(0.0)
        ),
    }
}

/// Overlay position expressions for a slide from or to `edge`.
fn slide_position(
    direction: RampDirection,
    edge: Edge,
    duration: f64,
    clip_duration: f64,
    canvas: FrameSize,
) -> (String, String) {
    let (w, h) = (canvas.width, canvas.height);
    let progress = match direction {
        RampDirection::In => format!("(1-min(t/{duration:.3},1))"),
        RampDirection::Out => format!(
            "max(0,(t-{:.3})/{duration:.3})",
            (clip_duration - duration).max(0.0)
        ),
    };
    match edge {
        Edge::Left => (format!("-{w}*{progress}"), "0".to_string()),
        Edge::Right => (format!("{w}*{progress}"), "0".to_string()),
        Edge::Top => ("0".to_string(), format!("-{h}*{progress}")),
        Edge::Bottom => ("0".to_string(), format!("{h}*{progress}")),
    }
}

/// Escape a path for use as a filter option value.
pub fn escape_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | ':' | '\'' | ',' | '[' | ']' | ';') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `#RRGGBB` to ffmpeg's `0xRRGGBB`; other forms pass through.
pub fn ffmpeg_color(color: &str) -> String {
    match color.strip_prefix('#') {
        Some(hex) => format!("0x{hex}"),
        None => color.to_string(),
    }
}
