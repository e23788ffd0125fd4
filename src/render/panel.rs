use crate::display::StatusMessage;

/// 状態表示パネル。コンソールに1行で出す。
///
/// 表示頻度の制御は調停器(DisplayArbiter)の仕事であり、
/// ここは渡されたものをそのまま出すだけ。
#[derive(Debug, Default)]
pub struct StatusPanel;

impl StatusPanel {
    pub fn new() -> Self {
        Self
    }

    pub fn show(&mut self, message: &StatusMessage) {
        println!(
            "[{}] σ={:.2} μ={:.2}",
            message.state.label(),
            message.std_dev,
            message.mean
        );
    }

    /// 再生終了などの通知行
    pub fn show_note(&mut self, note: &str) {
        println!("{note}");
    }
}

/// 推論FPSパネル
#[derive(Debug, Default)]
pub struct FpsPanel;

impl FpsPanel {
    pub fn new() -> Self {
        Self
    }

    pub fn update(&mut self, fps: f32) {
        println!("inference: {:.1} fps", fps);
    }
}
