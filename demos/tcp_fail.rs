//! Two resolutions racing against each other: one against loopback, one
//! against a hostname that will never resolve, both under the fault
//! injector's global resolver-loss knob.

use netrt::{Address, AddressStatus};

pub fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_max_level(tracing::Level::DEBUG)
        .with_thread_names(true)
        .init();

    netrt::simulate_resolver_loss(0);

    let good = Address::resolve("localhost");
    let bad = Address::resolve("no-such-host.invalid");

    let good_status = good.wait_resolved(-1);
    let bad_status = bad.wait_resolved(-1);

    tracing::info!(?good_status, string = ?good.string(), "good resolution");
    tracing::info!(?bad_status, error = ?netrt::get_last_error(), "bad resolution");

    assert_eq!(good_status, AddressStatus::Resolved);
    assert_eq!(bad_status, AddressStatus::Failed);

    tracing::info!("now forcing every resolution to fail via the fault injector");
    netrt::simulate_resolver_loss(100);
    let forced = Address::resolve("localhost");
    assert_eq!(forced.wait_resolved(-1), AddressStatus::Failed);
    assert_eq!(netrt::get_last_error().as_deref(), Some("simulated failure"));
    netrt::simulate_resolver_loss(0);

    Ok(())
}
