//! # Protocols Module
//!
//! Wire formats spoken by the workspace services.

/// Request/response envelopes and framing of the ENC service.
pub mod enc_rpc;
