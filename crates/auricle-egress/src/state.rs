#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Provisioning,
    Running,
    Stopping,
    Stopped,
}
