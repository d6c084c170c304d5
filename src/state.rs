//! Live connection state.

/// Printer activity flags plus the one protocol-compatibility flag.
///
/// Owned by the connection's control task: created at connection
/// establishment, updated as commands are observed, discarded at
/// disconnect. Never shared across tasks; the translator is handed a
/// mutable borrow for the single documented side effect on
/// `relative_positioning_emulated`.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    /// A print (from any source) is in progress.
    pub is_printing: bool,
    /// The active print runs from on-device storage, not streamed commands.
    pub is_printing_from_storage: bool,
    /// Device is not mid-operation and will accept card-listing commands.
    pub is_ready: bool,
    /// The device lacks native relative positioning and the translator is
    /// emulating it by tracking deltas in absolute mode.
    pub relative_positioning_emulated: bool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }
}
