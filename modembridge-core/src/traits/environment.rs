//! State Machine Environment
//!
//! The connection state machine advances by querying and poking the rest
//! of the bridge: is the modem ready, can we connect, are the buffers
//! drained. `StateEnvironment` is that narrow view. The bridge implements
//! it over its collaborators and pipelines; tests implement it with plain
//! fields.

use crate::errors::BridgeResult;

/// What the state machine may ask of, and do to, the rest of the bridge
pub trait StateEnvironment {
    /// Serial/modem collaborator reports ready
    fn modem_ready(&self) -> bool;

    /// Attempt one network connection
    fn try_connect(&mut self) -> BridgeResult<()>;

    /// Network collaborator reports an established connection
    fn network_connected(&self) -> bool;

    /// Connect-time option negotiation has finished
    fn negotiation_complete(&self) -> bool;

    /// Bytes still waiting in either pipeline (buffered or pending output)
    fn pending_bytes(&self) -> usize;

    /// Enable or disable chunk processing in both pipelines
    fn set_pipelines_active(&mut self, active: bool);

    /// Tear down the network connection
    fn disconnect(&mut self);
}
