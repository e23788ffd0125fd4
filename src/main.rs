use mimamori::config::Config;
use mimamori::pipeline;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "config.toml";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load_or_default(CONFIG_PATH);

    println!("=== mimamori {} ===", env!("GIT_VERSION"));
    match config.app.video.as_deref() {
        Some(path) if !path.is_empty() => println!("入力: 動画ファイル {}", path),
        _ => println!("入力: カメラ {}", config.camera.index),
    }
    println!(
        "検出器: model={} backend={} max_poses={} mirror={}",
        config.detector.model,
        config.detector.backend,
        config.detector.max_poses,
        config.detector.mirror
    );
    println!("目標FPS: {}", config.app.target_fps);
    println!();
    println!("操作: [M] モデル切替  [B] バックエンド切替  [F] ミラー  [Esc] 終了");
    println!();

    // 構成エラー・再構築失敗は致命的。リトライせず状態を表示して停止する。
    if let Err(err) = pipeline::run(&config) {
        eprintln!("致命的エラー: {err:#}");
        std::process::exit(1);
    }
}
