pub type Result<T> = std::result::Result<T, ControlError>;

/// Per-tick failure taxonomy. None of these is fatal, the control loop logs
/// and retries on the next scheduled tick.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("price signal fetch failed")]
    SourceUnavailable(#[source] anyhow::Error),
    #[error("device snapshot fetch failed")]
    DeviceUnavailable(#[source] anyhow::Error),
    #[error("device setpoint write failed")]
    WriteFailed(#[source] anyhow::Error),
}
