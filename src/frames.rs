//! Frame acquisition for ingestion and search.
//!
//! Images decode in-process via the `image` crate. Videos are sampled by an
//! external `ffmpeg` invocation that dumps every Nth frame into a temp dir;
//! consecutive frames are near-duplicates, so the stride bounds compute.

use anyhow::Context;
use std::io::Write;
use std::process::Command;

use crate::extract::DecodedFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Classify an upload from its magic bytes, not its filename.
pub fn detect_kind(data: &[u8]) -> MediaKind {
    match infer::get(data) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Video => MediaKind::Video,
        _ => MediaKind::Image,
    }
}

/// Decode a single image into an RGB frame.
pub fn decode_image(data: &[u8]) -> anyhow::Result<DecodedFrame> {
    let image = image::load_from_memory(data)
        .context("Failed to decode image")?
        .to_rgb8();

    Ok(DecodedFrame {
        width: image.width(),
        height: image.height(),
        rgb: image.into_raw(),
    })
}

/// Dump every `stride`th frame of a video and decode the samples.
///
/// A sampled frame that fails to decode is logged and skipped; the video
/// itself failing to demux is an error for the caller.
pub fn sample_video_frames(data: &[u8], stride: u32) -> anyhow::Result<Vec<DecodedFrame>> {
    let workdir = tempfile::tempdir().context("failed to create frame dump dir")?;

    let input_path = workdir.path().join("input");
    let mut input = std::fs::File::create(&input_path)?;
    input.write_all(data)?;
    input.flush()?;

    let pattern = workdir.path().join("frame-%06d.png");
    let output = Command::new("ffmpeg")
        .arg("-i")
        .arg(&input_path)
        .arg("-vf")
        .arg(format!("select=not(mod(n\\,{stride}))"))
        .arg("-vsync")
        .arg("vfr")
        .arg("-loglevel")
        .arg("error")
        .arg("-y")
        .arg(&pattern)
        .output()
        .context("failed to run ffmpeg")?;

    if !output.status.success() {
        anyhow::bail!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let mut frame_paths: Vec<_> = std::fs::read_dir(workdir.path())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("frame-"))
                .unwrap_or(false)
        })
        .collect();
    frame_paths.sort();

    let mut frames = Vec::with_capacity(frame_paths.len());
    for path in frame_paths {
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("skipping unreadable frame {}: {err}", path.display());
                continue;
            }
        };
        match decode_image(&bytes) {
            Ok(frame) => frames.push(frame),
            Err(err) => log::warn!("skipping undecodable frame {}: {err}", path.display()),
        }
    }

    Ok(frames)
}
