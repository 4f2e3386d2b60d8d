//! API handlers for the OTP gate.

pub mod health;
pub mod otp;
pub mod root;
