//! String-decoder lifting
//!
//! Consumes the sandbox execution trace: functions that the trace shows
//! being called with small arguments and returning strings
//! deterministically are decoders, and each covered call site is
//! replaced by the observed string. A function that ever returned two
//! different values for the same arguments is disqualified; sites the
//! trace never observed stay untouched.

pub mod lifter;

pub use lifter::DecoderLiftingPass;
