//! A round-based mini game loop: the round machine waits for every
//! player machine to finish its turn cycle before scoring.
//!
//! Run with `cargo run --example game_round`.

use framestate::{Builder, MachineId, Registry, Tick};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

fn build_player(
    registry: &mut Registry,
    name: &str,
    turn_over: &Rc<Cell<bool>>,
) -> Result<MachineId, Box<dyn std::error::Error>> {
    let mut b = Builder::new(name);
    let waiting = b.state("Waiting");
    let acting = b.state("Acting");
    b.initial(waiting);

    let start_sensed = Rc::clone(turn_over);
    let end_sensed = Rc::clone(turn_over);
    b.in_state(waiting)
        .if_not(move || start_sensed.get())
        .then(acting)
        .transition_name("take the turn");
    b.in_state(acting)
        .if_(move || end_sensed.get())
        .then(waiting)
        .transition_name("end the turn");
    Ok(b.build(registry)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let mut registry = Registry::new();
    let turn_over = Rc::new(Cell::new(false));

    let alice = build_player(&mut registry, "player-alice", &turn_over)?;
    let bob = build_player(&mut registry, "player-bob", &turn_over)?;

    let mut b = Builder::new("round");
    let playing = b.state("Playing");
    let scoring = b.state("Scoring");
    let done = b.state("Done");
    b.initial(playing);
    // The round leaves Playing only after both players complete a cycle.
    b.depends_on(playing, vec![alice, bob]);
    b.in_state(playing).else_().then(scoring);
    b.in_state(scoring).else_().then(done);
    b.machine_on_transition(|ev| {
        println!("[frame {:>2}] round: {} -> {}", ev.frame, ev.from, ev.to);
    });
    let round = b.build(&mut registry)?;

    // Alice steps before Bob within each round tick.
    registry.attach_child(round, alice, 10)?;
    registry.attach_child(round, bob, 5)?;

    for frame in 0..8u64 {
        // Both players wrap up their turns on frame 3.
        turn_over.set(frame >= 3);
        registry.run_frame(
            round,
            Tick {
                frame,
                now: Duration::from_millis(frame * 100),
            },
        )?;
        println!(
            "[frame {frame:>2}] round={:?} alice={:?} bob={:?}",
            registry.current_state_name(round),
            registry.current_state_name(alice),
            registry.current_state_name(bob),
        );
        if registry.current_state_name(round) == Some("Done") {
            break;
        }
    }

    let snapshot = registry.snapshot();
    println!("snapshot: {}", serde_json::to_string_pretty(&snapshot)?);
    registry.destroy(round);
    registry.shutdown();
    Ok(())
}
