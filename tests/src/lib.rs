//! End-to-end scenario tests for the meridian network runner.
//!
//! These exercise the full stack: the control server over real HTTP, the
//! SDK client, the local network manager spawning stub node processes, and
//! mock API clients standing in for the nodes' JSON-RPC surface.
//!
//! Run with:
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod e2e_control;
