//! A timed traffic light cycling green -> yellow -> red forever.
//!
//! Run with `cargo run --example traffic_light`.

use framestate::{Builder, Registry, Tick, Wait};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let mut registry = Registry::new();
    let mut b = Builder::new("traffic-light");
    let green = b.state("Green");
    let yellow = b.state("Yellow");
    let red = b.state("Red");
    b.initial(green);

    b.timeout(green, Duration::from_secs(8));
    b.timeout(yellow, Duration::from_secs(2));
    b.timeout(red, Duration::from_secs(6));

    b.in_state(green)
        .else_()
        .then(yellow)
        .transition_name("prepare to stop");
    b.in_state(yellow)
        .else_()
        .then(red)
        .transition_name("stop");
    b.in_state(red)
        .else_()
        .wait(Wait::Delay(Duration::from_secs(1))) // all-red clearance
        .then(green)
        .transition_name("go");

    b.machine_on_transition(|ev| {
        println!("[frame {:>3}] {} -> {}", ev.frame, ev.from, ev.to);
    });
    let light = b.build(&mut registry)?;

    // Simulate one minute at 10 frames per second.
    for frame in 0..600u64 {
        let now = Duration::from_millis(frame * 100);
        registry.run_frame(light, Tick { frame, now })?;
    }

    println!(
        "final state: {}",
        registry.current_state_name(light).unwrap_or("?")
    );
    println!("recent path: {:?}", registry.machine(light).map(|m| m.history().path()));
    Ok(())
}
