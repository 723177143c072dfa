//! BDD scenarios for the VM lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Bring up the VM, share, and credentials"
)]
fn scenario_full_up(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "A share daemon that never becomes ready blocks the mount"
)]
fn scenario_never_ready(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "A stale share installation is replaced"
)]
fn scenario_stale_share(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "A failed credential fetch keeps earlier credentials"
)]
fn scenario_partial_credentials(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Destroy halts everything first even when the VM will not stop"
)]
fn scenario_destroy(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Halting twice is harmless"
)]
fn scenario_halt_twice(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}
