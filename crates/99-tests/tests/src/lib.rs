//! End-to-end scenarios driving the MCDI engine against the simulated
//! controller on real threads.

#[cfg(test)]
mod support;

#[cfg(test)]
mod rpc_e2e;

#[cfg(test)]
mod events_e2e;

#[cfg(test)]
mod recovery_e2e;
