//! Interface tests for the event emitter using Cucumber.
//!
//! These tests describe emitter behavior in Gherkin against a scripted
//! runtime, so native and foreign listeners are exercised together.
//!
//! ```bash
//! cargo test --test interfaces --features test-utils
//! ```

mod steps;

use cucumber::World;
use steps::emitter::EmitterWorld;

#[tokio::main]
async fn main() {
    println!("\n=== Running Emitter Interface Tests ===\n");
    EmitterWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/emitter.feature")
        .await;
}
