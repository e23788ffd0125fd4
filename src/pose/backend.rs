use anyhow::{bail, Context, Result};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use tracing::debug;

use crate::config::DetectorConfig;

/// バックエンド識別子と実行フラグから ort セッションビルダーを構成する。
///
/// バックエンド変更時に毎回呼び直される。CUDAのプロバイダ初期化は
/// 時間がかかることがあるが、呼び出し側(ライフサイクル管理)が
/// 推論の合間にしか呼ばないので問題にならない。
pub fn session_builder(config: &DetectorConfig) -> Result<SessionBuilder> {
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to configure session optimization")?;

    if config.intra_threads > 0 {
        builder = builder
            .with_intra_threads(config.intra_threads)
            .context("Failed to set intra-op threads")?;
    }

    match config.backend.as_str() {
        "cpu" => {
            debug!("ort backend: cpu (intra_threads={})", config.intra_threads);
        }
        "cuda" => {
            #[cfg(feature = "cuda")]
            {
                debug!("ort backend: cuda");
                builder = builder
                    .with_execution_providers([
                        ort::execution_providers::CUDAExecutionProvider::default().build(),
                    ])
                    .context("Failed to register CUDA execution provider")?;
            }
            #[cfg(not(feature = "cuda"))]
            bail!("backend \"cuda\" はこのビルドでは使えません (feature \"cuda\" が必要)");
        }
        other => bail!("unknown backend: {other}"),
    }

    Ok(builder)
}
