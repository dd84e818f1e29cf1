//! Clip assembly: lossless concat, final transcode, frame extraction.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Final output resolution when upscaling is enabled.
pub const FINAL_WIDTH: u32 = 1920;
pub const FINAL_HEIGHT: u32 = 1080;

/// Write an FFmpeg concat-demuxer list file next to the clips.
///
/// Single quotes in paths are escaped per the demuxer's quoting rules.
pub fn write_concat_list(parts: &[PathBuf], list_path: &Path) -> MediaResult<()> {
    let mut body = String::new();
    for part in parts {
        let escaped = part.to_string_lossy().replace('\'', "'\\''");
        body.push_str(&format!("file '{}'\n", escaped));
    }
    std::fs::write(list_path, body)?;
    Ok(())
}

fn concat_command(list_path: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(list_path, output)
        .input_args(["-f", "concat", "-safe", "0"])
        .codec_copy()
}

fn final_encode_command(input: &Path, output: &Path, upscale: bool) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(input, output)
        .video_codec("libx264")
        .pixel_format("yuv420p")
        .no_audio();
    if upscale {
        cmd = cmd.video_filter(format!(
            "scale={}:{}:flags=lanczos",
            FINAL_WIDTH, FINAL_HEIGHT
        ));
    }
    cmd
}

fn first_frame_command(video: &Path, image: &Path) -> FfmpegCommand {
    FfmpegCommand::new(video, image).single_frame()
}

/// Concatenate raw clips losslessly (stream copy, input order).
///
/// A single clip is returned as-is without invoking FFmpeg.
pub async fn concat_copy(parts: &[PathBuf], work_dir: &Path) -> MediaResult<PathBuf> {
    match parts {
        [] => Err(MediaError::ffmpeg_failed(
            "No clips to concatenate",
            None,
            None,
        )),
        [single] => Ok(single.clone()),
        _ => {
            let list_path = work_dir.join("concat.txt");
            write_concat_list(parts, &list_path)?;

            let output = work_dir.join("concat_raw.mp4");
            info!("Concatenating {} raw clips", parts.len());
            FfmpegRunner::new()
                .run(&concat_command(&list_path, &output))
                .await?;
            Ok(output)
        }
    }
}

/// Re-encode the concatenated stream once at final resolution, audio
/// stripped.
pub async fn final_encode(input: &Path, output: &Path, upscale: bool) -> MediaResult<()> {
    info!(
        "Final encode: {} -> {} (upscale: {})",
        input.display(),
        output.display(),
        upscale
    );
    FfmpegRunner::new()
        .run(&final_encode_command(input, output, upscale))
        .await
}

/// Extract the first frame of a video into a still image.
pub async fn extract_first_frame(video: &Path, image: &Path) -> MediaResult<()> {
    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }
    FfmpegRunner::new()
        .run(&first_frame_command(video, image))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_args_use_stream_copy() {
        let cmd = concat_command(Path::new("/w/concat.txt"), Path::new("/w/concat_raw.mp4"));
        let args = cmd.build_args();
        assert!(args.windows(2).any(|w| w == ["-f", "concat"]));
        assert!(args.windows(2).any(|w| w == ["-safe", "0"]));
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        // stream copy must never re-encode
        assert!(!args.contains(&"libx264".to_string()));
    }

    #[test]
    fn final_encode_args_fix_codec_and_strip_audio() {
        let cmd = final_encode_command(Path::new("in.mp4"), Path::new("out.mp4"), true);
        let args = cmd.build_args();
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "yuv420p"]));
        assert!(args.contains(&"-an".to_string()));
        assert!(args
            .iter()
            .any(|a| a.contains("scale=1920:1080") && a.contains("lanczos")));
    }

    #[test]
    fn final_encode_without_upscale_has_no_filter() {
        let cmd = final_encode_command(Path::new("in.mp4"), Path::new("out.mp4"), false);
        let args = cmd.build_args();
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[test]
    fn first_frame_args_request_single_frame() {
        let cmd = first_frame_command(Path::new("v.mp4"), Path::new("c.png"));
        let args = cmd.build_args();
        assert!(args.windows(2).any(|w| w == ["-vframes", "1"]));
    }

    #[test]
    fn concat_list_escapes_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("concat.txt");
        let parts = vec![
            dir.path().join("a.mp4"),
            dir.path().join("it's.mp4"),
        ];
        write_concat_list(&parts, &list).unwrap();

        let body = std::fs::read_to_string(&list).unwrap();
        assert_eq!(body.lines().count(), 2);
        assert!(body.contains("a.mp4'"));
        assert!(body.contains("'\\''"));
    }

    #[tokio::test]
    async fn single_clip_concat_is_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("only.mp4");
        std::fs::write(&clip, b"x").unwrap();

        let out = concat_copy(&[clip.clone()], dir.path()).await.unwrap();
        assert_eq!(out, clip);
    }

    #[tokio::test]
    async fn empty_concat_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(concat_copy(&[], dir.path()).await.is_err());
    }
}
