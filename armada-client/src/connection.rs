//! Connection establishment and the network thread
//!
//! [`establish`] resolves and connects with retry under a deadline;
//! [`worker`] owns the connected socket on a dedicated thread and drives
//! the duplex read/write loop until either side shuts the link down.

pub(crate) mod establish;
pub(crate) mod worker;

pub(crate) use establish::establish;
pub(crate) use worker::{spawn_network_thread, Command};
