use std::time::{Duration, Instant};

use crate::anomaly::{MotionEvent, MotionState};

/// 平常メッセージの最小更新間隔。UIの書き換え過多を防ぐ。
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(10);

/// 急変表示の優先表示時間。この間は平常メッセージで上書きしない。
pub const ANOMALY_DISPLAY_DURATION: Duration = Duration::from_millis(500);

/// 表示側へ渡す1件分のステータス
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusMessage {
    pub std_dev: f32,
    pub mean: f32,
    pub state: MotionState,
}

impl StatusMessage {
    fn from_event(event: &MotionEvent) -> Self {
        Self {
            std_dev: event.std_dev,
            mean: event.mean,
            state: event.state,
        }
    }
}

/// どのイベントを表示に流すかを決める調停器。
///
/// 急変は即時・無条件で表示する。平常ステータスはレート制限付きで、
/// さらに直近の急変表示から一定時間は抑止する(読む時間を確保するため)。
/// 多くのティックでは何も返さない。呼び出し側は「更新なし」を許容すること。
#[derive(Debug, Default)]
pub struct DisplayArbiter {
    last_anomaly: Option<Instant>,
    last_update: Option<Instant>,
}

impl DisplayArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1ティック分のイベント列から表示メッセージを決める。
    ///
    /// 同一ティックに対象キーポイントが複数ある場合は後勝ち
    /// (姿勢内のキーポイント挿入順で最後に処理されたものが表示される)。
    pub fn decide(&mut self, events: &[MotionEvent], now: Instant) -> Option<StatusMessage> {
        let mut last_anomaly_event = None;
        let mut last_normal_event = None;
        for event in events {
            match event.state {
                MotionState::Anomaly => last_anomaly_event = Some(event),
                MotionState::Normal => last_normal_event = Some(event),
            }
        }

        // 急変はこのティックの終端分岐: 即時表示し、平常は同ティックでは出さない
        if let Some(event) = last_anomaly_event {
            self.last_anomaly = Some(now);
            return Some(StatusMessage::from_event(event));
        }

        let event = last_normal_event?;
        if within(self.last_anomaly, now, ANOMALY_DISPLAY_DURATION) {
            return None;
        }
        if within(self.last_update, now, UPDATE_INTERVAL) {
            return None;
        }
        self.last_update = Some(now);
        Some(StatusMessage::from_event(event))
    }
}

/// stamp から window 以内か。未記録(None)は「十分昔」とみなす。
fn within(stamp: Option<Instant>, now: Instant, window: Duration) -> bool {
    match stamp {
        Some(t) => now.saturating_duration_since(t) <= window,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::KeypointIndex;

    fn event(state: MotionState, std_dev: f32, at: Instant) -> MotionEvent {
        MotionEvent {
            keypoint: KeypointIndex::Nose,
            std_dev,
            mean: std_dev / 2.0,
            state,
            at,
        }
    }

    #[test]
    fn test_anomaly_always_shown_immediately() {
        let mut arbiter = DisplayArbiter::new();
        let t0 = Instant::now();

        let msg = arbiter.decide(&[event(MotionState::Anomaly, 1.0, t0)], t0);
        assert_eq!(msg.unwrap().state, MotionState::Anomaly);

        // 直後の急変もレート制限を受けない
        let t1 = t0 + Duration::from_millis(1);
        let msg = arbiter.decide(&[event(MotionState::Anomaly, 1.1, t1)], t1);
        assert_eq!(msg.unwrap().state, MotionState::Anomaly);
    }

    #[test]
    fn test_anomaly_suppresses_normal_in_same_tick() {
        let mut arbiter = DisplayArbiter::new();
        let t0 = Instant::now();

        let events = [
            event(MotionState::Normal, 0.1, t0),
            event(MotionState::Anomaly, 1.0, t0),
            event(MotionState::Normal, 0.2, t0),
        ];
        let msg = arbiter.decide(&events, t0).unwrap();
        assert_eq!(msg.state, MotionState::Anomaly);
        assert_eq!(msg.std_dev, 1.0);
    }

    #[test]
    fn test_no_normal_within_anomaly_display_duration() {
        let mut arbiter = DisplayArbiter::new();
        let t0 = Instant::now();
        arbiter.decide(&[event(MotionState::Anomaly, 1.0, t0)], t0);

        // 500ms以内の平常は抑止される
        let t1 = t0 + Duration::from_millis(400);
        assert!(arbiter.decide(&[event(MotionState::Normal, 0.1, t1)], t1).is_none());

        // 500msを超えたら表示される
        let t2 = t0 + Duration::from_millis(501);
        let msg = arbiter.decide(&[event(MotionState::Normal, 0.1, t2)], t2);
        assert_eq!(msg.unwrap().state, MotionState::Normal);
    }

    #[test]
    fn test_normal_rate_limited() {
        let mut arbiter = DisplayArbiter::new();
        let t0 = Instant::now();

        let msg = arbiter.decide(&[event(MotionState::Normal, 0.1, t0)], t0);
        assert!(msg.is_some());

        // 10ms以内の平常更新は抑止
        let t1 = t0 + Duration::from_millis(5);
        assert!(arbiter.decide(&[event(MotionState::Normal, 0.2, t1)], t1).is_none());

        // 10msを超えたら通る
        let t2 = t0 + Duration::from_millis(11);
        assert!(arbiter.decide(&[event(MotionState::Normal, 0.2, t2)], t2).is_some());
    }

    #[test]
    fn test_suppressed_normal_does_not_touch_update_stamp() {
        let mut arbiter = DisplayArbiter::new();
        let t0 = Instant::now();
        arbiter.decide(&[event(MotionState::Normal, 0.1, t0)], t0);

        // 抑止されたティックで last_update が進まないこと
        let t1 = t0 + Duration::from_millis(5);
        assert!(arbiter.decide(&[event(MotionState::Normal, 0.2, t1)], t1).is_none());
        let t2 = t0 + Duration::from_millis(11);
        assert!(arbiter.decide(&[event(MotionState::Normal, 0.3, t2)], t2).is_some());
    }

    #[test]
    fn test_last_normal_event_wins() {
        let mut arbiter = DisplayArbiter::new();
        let t0 = Instant::now();

        let events = [
            event(MotionState::Normal, 0.1, t0),
            event(MotionState::Normal, 0.3, t0),
        ];
        let msg = arbiter.decide(&events, t0).unwrap();
        assert_eq!(msg.std_dev, 0.3);
    }

    #[test]
    fn test_empty_events_silent() {
        let mut arbiter = DisplayArbiter::new();
        assert!(arbiter.decide(&[], Instant::now()).is_none());
    }
}
