use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use tracing::debug;

use crate::config::{AppConfig, CameraConfig};

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 解像度とFPSを指定してカメラを開く
    pub fn open(index: i32, width: u32, height: u32, fps: u32) -> Result<Self> {
        let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
            .context("Failed to open camera")?;

        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", index);
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
        capture.set(videoio::CAP_PROP_FPS, fps as f64)?;
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        debug!("camera {}x{} @{}fps", actual_width, actual_height, capture.get(videoio::CAP_PROP_FPS)?);

        Ok(Self {
            capture,
            width: actual_width,
            height: actual_height,
        })
    }

    /// フレームを読み込む(BGR形式)。カメラからの空フレームはエラー扱い。
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// 動画ファイル再生。末尾に達すると finished になる。
pub struct VideoFile {
    capture: VideoCapture,
    width: u32,
    height: u32,
    finished: bool,
}

impl VideoFile {
    pub fn open(path: &str) -> Result<Self> {
        let capture = VideoCapture::from_file(path, VideoCaptureAPIs::CAP_ANY as i32)
            .with_context(|| format!("Failed to open video file: {path}"))?;

        if !capture.is_opened()? {
            anyhow::bail!("Video file {} could not be opened", path);
        }

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        debug!("video {path}: {width}x{height}");

        Ok(Self {
            capture,
            width,
            height,
            finished: false,
        })
    }

    /// 次フレームを読む。ストリーム終端では None を返し finished を立てる。
    pub fn read_frame(&mut self) -> Result<Option<Mat>> {
        if self.finished {
            return Ok(None);
        }
        let mut frame = Mat::default();
        let ok = self.capture.read(&mut frame)?;
        if !ok || frame.empty() {
            self.finished = true;
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

/// パイプラインに見せる入力ソース。カメラ or 動画ファイル。
///
/// 「現在フレーム」と「終端シグナル」だけを公開し、
/// 取得方式の違いは内側に閉じ込める。
pub enum FrameSource {
    Camera(OpenCvCamera),
    File(VideoFile),
}

impl FrameSource {
    /// 設定から入力ソースを開く。video 指定があればファイル、無ければカメラ。
    pub fn open(app: &AppConfig, camera: &CameraConfig) -> Result<Self> {
        match app.video.as_deref() {
            Some(path) if !path.is_empty() => Ok(Self::File(VideoFile::open(path)?)),
            _ => Ok(Self::Camera(OpenCvCamera::open(
                camera.index,
                camera.width,
                camera.height,
                camera.fps,
            )?)),
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        match self {
            Self::Camera(camera) => (camera.width, camera.height),
            Self::File(video) => (video.width, video.height),
        }
    }

    /// 現在フレームを取り出す。None はストリーム終端(カメラでは起きない)。
    pub fn next_frame(&mut self) -> Result<Option<Mat>> {
        match self {
            Self::Camera(camera) => camera.read_frame().map(Some),
            Self::File(video) => video.read_frame(),
        }
    }

    /// 再生が終端に達したか
    pub fn finished(&self) -> bool {
        match self {
            Self::Camera(_) => false,
            Self::File(video) => video.finished,
        }
    }
}
