//! Device provisioning and the live telemetry session protocol.
//!
//! An edge agent asks for a claim token, a signed-in user redeems it into a
//! device, and the agent streams telemetry over a session opened with the
//! same token. The agent may connect before the claim is redeemed; the
//! session then waits for approval.

pub mod claim;
pub mod frames;
pub mod session;


pub use claim::{MAX_NAME_LEN, ProvisioningService};
pub use frames::{AcceptedFrame, FrameError, ServerMessage, parse_frame};
pub use session::{
    Inbound, POLICY_VIOLATION, REASON_INVALID_TOKEN, REASON_PROTOCOL, REASON_TIMEOUT,
    SessionOutcome, SessionTransport, TelemetrySession, TransportClosed,
};
