use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// パイプラインの目標ティックレート
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// 動画ファイルパス。未指定ならカメラ入力
    #[serde(default)]
    pub video: Option<String>,
}

fn default_target_fps() -> u32 { 60 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            video: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: i32,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

fn default_camera_width() -> u32 { 640 }
fn default_camera_height() -> u32 { 480 }
fn default_camera_fps() -> u32 { 30 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_camera_width(),
            height: default_camera_height(),
            fps: default_camera_fps(),
        }
    }
}

/// 検出器の構成。ライフサイクル管理側が値比較してスワップ要否を決める。
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DetectorConfig {
    /// モデルID (e.g. "movenet_lightning", "spinepose_medium", "rtmw3d")
    #[serde(default = "default_model")]
    pub model: String,
    /// 推論バックエンド ("cpu" / "cuda")
    #[serde(default = "default_backend")]
    pub backend: String,
    /// ortセッションのスレッド数。0でort任せ
    #[serde(default)]
    pub intra_threads: usize,
    /// 1フレームあたりの最大検出人数
    #[serde(default = "default_max_poses")]
    pub max_poses: usize,
    /// 入力を左右反転するか
    #[serde(default)]
    pub mirror: bool,
}

fn default_model() -> String { "movenet_lightning".to_string() }
fn default_backend() -> String { "cpu".to_string() }
fn default_max_poses() -> usize { 1 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            backend: default_backend(),
            intra_threads: 0,
            max_poses: default_max_poses(),
            mirror: false,
        }
    }
}

impl DetectorConfig {
    /// モデル・バックエンド・実行フラグの変更はセッション再構築が必要。
    /// max_poses / mirror は推論オプションなのでその場で更新できる。
    pub fn requires_swap(&self, other: &Self) -> bool {
        self.model != other.model || self.requires_backend_reconfigure(other)
    }

    /// バックエンドまたは実行フラグの変更か
    pub fn requires_backend_reconfigure(&self, other: &Self) -> bool {
        self.backend != other.backend || self.intra_threads != other.intra_threads
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// デバッグウィンドウ表示(モデル切替キーもここで受ける)
    #[serde(default = "default_debug_view")]
    pub view: bool,
}

fn default_debug_view() -> bool { true }

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            view: default_debug_view(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 設定ファイルが無い・壊れている場合はデフォルトで起動する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    "{} を読めないためデフォルト設定を使用します: {err}",
                    path.as_ref().display()
                );
                Config::default()
            }
        }
    }
}
