use guard_proto::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlarmState {
    #[default]
    Silent,
    Alarming,
}

/// Alarm decision for the current signals.
///
/// Alarming only while the stream is open, at least one frame has arrived and no helmet is
/// seen; silent in every other combination. `_current` is accepted so callers can treat this
/// as a transition function; the outcome does not depend on it.
pub fn next_alarm_state(
    connection: ConnectionState,
    has_frame: bool,
    condition_met: bool,
    _current: AlarmState,
) -> AlarmState {
    if connection.is_open() && has_frame && !condition_met {
        AlarmState::Alarming
    } else {
        AlarmState::Silent
    }
}
