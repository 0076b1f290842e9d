use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use mangamotion_core::encoder::{VideoEncoder, PLACEHOLDER_CONTENT};
use mangamotion_core::interpolation::{BlendInterpolator, EngineMode, InterpolationEngine};
use mangamotion_core::{AnimationRequest, Pipeline, PipelineError};
use tempfile::{tempdir, TempDir};

const NO_ENCODER: &str = "mangamotion-no-such-encoder-3f1c";

fn write_png(dir: &Path, name: &str, rgb: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(16, 12, Rgb(rgb))
        .save(&path)
        .expect("write test png");
    path
}

fn blend_pipeline(encoder: &str) -> Pipeline {
    Pipeline::new(InterpolationEngine::blend(), VideoEncoder::new(encoder))
}

fn pipeline_error(err: &anyhow::Error) -> &PipelineError {
    err.downcast_ref::<PipelineError>()
        .unwrap_or_else(|| panic!("expected a pipeline error, got: {err:#}"))
}

#[test]
fn blend_mode_without_encoder_writes_placeholder() {
    let dir = tempdir().unwrap();
    let red = write_png(dir.path(), "001.png", [255, 0, 0]);
    let blue = write_png(dir.path(), "002.png", [0, 0, 255]);
    let out = dir.path().join("result.mp4");

    let pipeline = blend_pipeline(NO_ENCODER);
    assert_eq!(pipeline.mode(), EngineMode::Blend);

    let request = AnimationRequest::new(vec![blue, red])
        .with_multiplier(2)
        .with_fps(10)
        .with_output(&out);
    let result = pipeline.render(&request).expect("render should succeed");

    assert_eq!(result, out);
    assert!(out.is_file());
    assert_eq!(fs::read(&out).unwrap(), PLACEHOLDER_CONTENT);
}

#[test]
fn existing_output_is_overwritten() {
    let dir = tempdir().unwrap();
    let a = write_png(dir.path(), "p1.png", [10, 20, 30]);
    let b = write_png(dir.path(), "p2.png", [30, 20, 10]);
    let out = dir.path().join("nested").join("video.mp4");
    fs::create_dir_all(out.parent().unwrap()).unwrap();
    fs::write(&out, b"stale bytes from a previous run").unwrap();

    let result = blend_pipeline(NO_ENCODER)
        .render(&AnimationRequest::new(vec![a, b]).with_output(&out))
        .unwrap();
    assert_eq!(result, out);
    assert_eq!(fs::read(&out).unwrap(), PLACEHOLDER_CONTENT);
}

#[test]
fn explicit_output_parent_is_created() {
    let dir = tempdir().unwrap();
    let a = write_png(dir.path(), "p1.png", [0, 0, 0]);
    let b = write_png(dir.path(), "p2.png", [1, 1, 1]);
    let out = dir.path().join("a").join("b").join("video.mp4");

    blend_pipeline(NO_ENCODER)
        .render(&AnimationRequest::new(vec![a, b]).with_output(&out))
        .unwrap();
    assert!(out.is_file());
}

#[test]
fn learned_mode_without_encoder_is_fatal() {
    let dir = tempdir().unwrap();
    let a = write_png(dir.path(), "001.png", [255, 0, 0]);
    let b = write_png(dir.path(), "002.png", [0, 0, 255]);
    let out = dir.path().join("result.mp4");

    let pipeline = Pipeline::new(
        InterpolationEngine::learned(Box::new(BlendInterpolator)),
        VideoEncoder::new(NO_ENCODER),
    );
    assert_eq!(pipeline.mode(), EngineMode::Learned);

    let err = pipeline
        .render(&AnimationRequest::new(vec![a, b]).with_output(&out))
        .unwrap_err();
    assert!(matches!(
        pipeline_error(&err),
        PipelineError::EncoderUnavailable { .. }
    ));
    assert!(err.to_string().contains("Please install FFmpeg"));
}

#[test]
fn fewer_than_two_images_writes_nothing() {
    let dir = tempdir().unwrap();
    let only = write_png(dir.path(), "001.png", [255, 0, 0]);
    let broken = dir.path().join("002.png");
    fs::write(&broken, b"definitely not a png").unwrap();
    let out = dir.path().join("never").join("result.mp4");

    let err = blend_pipeline(NO_ENCODER)
        .render(&AnimationRequest::new(vec![only, broken]).with_output(&out))
        .unwrap_err();
    let pipeline_err = pipeline_error(&err);
    assert!(pipeline_err.is_validation());
    assert!(matches!(
        pipeline_err,
        PipelineError::NotEnoughImages {
            loaded: 1,
            requested: 2
        }
    ));
    assert!(!out.parent().unwrap().exists());
}

#[test]
fn empty_request_is_validation_error() {
    let err = blend_pipeline(NO_ENCODER)
        .render(&AnimationRequest::new(Vec::new()))
        .unwrap_err();
    assert!(pipeline_error(&err).is_validation());
}

#[cfg(unix)]
mod fake_encoder {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Records the materialized frame count, the frame directory, and the
    /// arguments into the output file, the way a real encoder would produce it.
    const RECORDING_SCRIPT: &str = r#"#!/bin/sh
for out; do :; done
prev=""
input=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"
done
dir=$(dirname "$input")
count=$(ls "$dir" | grep -c '^frame_[0-9]\{6\}\.png$')
{
  echo "frames=$count"
  echo "dir=$dir"
  echo "args=$*"
} > "$out"
"#;

    /// Copies the first and last materialized frames next to the output.
    const FRAME_COPY_SCRIPT: &str = r#"#!/bin/sh
for out; do :; done
prev=""
input=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"
done
dir=$(dirname "$input")
last=$(ls "$dir" | grep '^frame_' | sort | tail -n 1)
cp "$dir/frame_000000.png" "$out.first.png"
cp "$dir/$last" "$out.last.png"
: > "$out"
"#;

    const FAILING_SCRIPT: &str = r#"#!/bin/sh
echo "Error while opening encoder for output stream #0:0" >&2
exit 1
"#;

    fn install_script(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn field<'a>(report: &'a str, key: &str) -> &'a str {
        report
            .lines()
            .find_map(|line| line.strip_prefix(&format!("{key}=")))
            .unwrap_or_else(|| panic!("missing {key} in report:\n{report}"))
    }

    #[test]
    fn encoder_receives_every_timeline_frame() {
        let tools = tempdir().unwrap();
        let encoder = install_script(&tools, "ffmpeg", RECORDING_SCRIPT);
        let dir = tempdir().unwrap();
        let inputs = vec![
            write_png(dir.path(), "page10.png", [0, 0, 0]),
            write_png(dir.path(), "page2.png", [0, 0, 0]),
            write_png(dir.path(), "page1.png", [0, 0, 0]),
        ];
        let out = dir.path().join("out.mp4");

        blend_pipeline(&encoder)
            .render(
                &AnimationRequest::new(inputs)
                    .with_multiplier(4)
                    .with_fps(30)
                    .with_output(&out),
            )
            .unwrap();

        let report = fs::read_to_string(&out).unwrap();
        assert_eq!(field(&report, "frames"), "9");
        let args = field(&report, "args");
        assert!(args.contains("-framerate 30"), "args: {args}");
        assert!(args.contains("frame_%06d.png"), "args: {args}");
        assert!(args.contains("-c:v libx264"), "args: {args}");
        assert!(args.contains("-crf 17"), "args: {args}");
    }

    #[test]
    fn reversed_inputs_are_encoded_in_file_name_order() {
        let tools = tempdir().unwrap();
        let encoder = install_script(&tools, "ffmpeg", FRAME_COPY_SCRIPT);
        let dir = tempdir().unwrap();
        let red = write_png(dir.path(), "001.png", [255, 0, 0]);
        let blue = write_png(dir.path(), "002.png", [0, 0, 255]);
        let out = dir.path().join("result.mp4");

        blend_pipeline(&encoder)
            .render(
                &AnimationRequest::new(vec![blue, red])
                    .with_multiplier(2)
                    .with_output(&out),
            )
            .unwrap();

        let first = image::open(dir.path().join("result.mp4.first.png"))
            .unwrap()
            .to_rgb8();
        let last = image::open(dir.path().join("result.mp4.last.png"))
            .unwrap()
            .to_rgb8();
        assert_eq!(first.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(last.get_pixel(0, 0).0, [0, 0, 255]);
    }

    #[test]
    fn non_executable_encoder_falls_back_to_placeholder_in_blend_mode() {
        let tools = tempdir().unwrap();
        let encoder = tools.path().join("ffmpeg");
        fs::write(&encoder, RECORDING_SCRIPT).unwrap();
        fs::set_permissions(&encoder, fs::Permissions::from_mode(0o644)).unwrap();

        let dir = tempdir().unwrap();
        let a = write_png(dir.path(), "1.png", [0, 0, 0]);
        let b = write_png(dir.path(), "2.png", [255, 255, 255]);
        let out = dir.path().join("out.mp4");

        blend_pipeline(&encoder.to_string_lossy())
            .render(&AnimationRequest::new(vec![a, b]).with_output(&out))
            .unwrap();
        assert_eq!(fs::read(&out).unwrap(), PLACEHOLDER_CONTENT);
    }

    #[test]
    fn frames_directory_is_removed_after_encode() {
        let tools = tempdir().unwrap();
        let encoder = install_script(&tools, "ffmpeg", RECORDING_SCRIPT);
        let dir = tempdir().unwrap();
        let a = write_png(dir.path(), "1.png", [0, 0, 0]);
        let b = write_png(dir.path(), "2.png", [255, 255, 255]);
        let out = dir.path().join("out.mp4");

        blend_pipeline(&encoder)
            .render(&AnimationRequest::new(vec![a, b]).with_output(&out))
            .unwrap();

        let report = fs::read_to_string(&out).unwrap();
        assert!(!Path::new(field(&report, "dir")).exists());
    }

    #[test]
    fn multiplier_three_rounds_up_to_four() {
        let tools = tempdir().unwrap();
        let encoder = install_script(&tools, "ffmpeg", RECORDING_SCRIPT);
        let dir = tempdir().unwrap();
        let a = write_png(dir.path(), "1.png", [0, 0, 0]);
        let b = write_png(dir.path(), "2.png", [255, 255, 255]);
        let out = dir.path().join("out.mp4");

        blend_pipeline(&encoder)
            .render(
                &AnimationRequest::new(vec![a, b])
                    .with_multiplier(3)
                    .with_output(&out),
            )
            .unwrap();

        let report = fs::read_to_string(&out).unwrap();
        assert_eq!(field(&report, "frames"), "5");
    }

    #[test]
    fn encoder_failure_surfaces_stderr_and_cleans_up() {
        let tools = tempdir().unwrap();
        let encoder = install_script(&tools, "ffmpeg", FAILING_SCRIPT);
        let dir = tempdir().unwrap();
        let a = write_png(dir.path(), "1.png", [0, 0, 0]);
        let b = write_png(dir.path(), "2.png", [255, 255, 255]);
        let out_dir = dir.path().join("renders");

        let pipeline = blend_pipeline(&encoder).with_output_dir(Some(out_dir.clone()));
        let err = pipeline
            .render(&AnimationRequest::new(vec![a, b]))
            .unwrap_err();

        match pipeline_error(&err) {
            PipelineError::EncoderFailed { status, stderr } => {
                assert_eq!(status.code(), Some(1));
                assert!(stderr.contains("Error while opening encoder"), "{stderr}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[test]
    fn unnamed_output_is_allocated_and_kept() {
        let tools = tempdir().unwrap();
        let encoder = install_script(&tools, "ffmpeg", RECORDING_SCRIPT);
        let dir = tempdir().unwrap();
        let a = write_png(dir.path(), "1.png", [0, 0, 0]);
        let b = write_png(dir.path(), "2.png", [255, 255, 255]);
        let out_dir = dir.path().join("renders");

        let output = blend_pipeline(&encoder)
            .with_output_dir(Some(out_dir.clone()))
            .render(&AnimationRequest::new(vec![a, b]))
            .unwrap();

        assert_eq!(output.parent(), Some(out_dir.as_path()));
        assert_eq!(output.extension().and_then(|e| e.to_str()), Some("mp4"));
        assert_eq!(field(&fs::read_to_string(&output).unwrap(), "frames"), "3");
    }
}

#[test]
#[ignore = "requires ffmpeg with libx264 on PATH"]
fn real_ffmpeg_produces_video() {
    let dir = tempdir().unwrap();
    let red = write_png(dir.path(), "001.png", [255, 0, 0]);
    let blue = write_png(dir.path(), "002.png", [0, 0, 255]);
    let out = dir.path().join("real.mp4");

    let pipeline = blend_pipeline("ffmpeg");
    assert!(pipeline.encoder().is_available());

    pipeline
        .render(
            &AnimationRequest::new(vec![red, blue])
                .with_multiplier(4)
                .with_fps(12)
                .with_output(&out),
        )
        .unwrap();

    let bytes = fs::read(&out).unwrap();
    assert!(bytes.len() > PLACEHOLDER_CONTENT.len());
    assert_ne!(bytes, PLACEHOLDER_CONTENT);
}
