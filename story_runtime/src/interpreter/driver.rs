//! Fixed-rate loop connecting an interpreter to a host's input and display.

use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{EndReason, Frame, Input, Phase, SceneInterpreter};
use crate::error::EngineError;
use crate::persistence::PersistenceGateway;
use crate::script::ScriptStore;

/// Source of player input, polled once per tick.
pub trait InputSource {
    /// Inputs received since the last poll, oldest first.
    fn poll(&mut self) -> Vec<Input>;
}

/// Receives one frame per tick.
pub trait FrameSink {
    fn present(&mut self, frame: &Frame);
}

/// Run until the story terminates.
///
/// Each tick drains pending input, advances the notification timer, emits a
/// frame and sleeps until the next tick. The interpreter is started first if
/// it is still idle.
pub fn run<S, P, I, F>(
    interpreter: &mut SceneInterpreter<S, P>,
    input: &mut I,
    sink: &mut F,
    frame_duration: Duration,
) -> Result<EndReason, EngineError>
where
    S: ScriptStore,
    P: PersistenceGateway,
    I: InputSource,
    F: FrameSink,
{
    if interpreter.phase() == Phase::Idle {
        interpreter.start()?;
    }

    let mut ticks: u64 = 0;
    loop {
        let tick_start = Instant::now();

        for event in input.poll() {
            interpreter.handle(event)?;
            if interpreter.phase().is_terminated() {
                break;
            }
        }

        interpreter.tick();
        sink.present(&interpreter.frame());
        ticks += 1;

        if let Phase::Terminated(reason) = interpreter.phase() {
            info!(ticks, reason = ?reason, "Story loop finished");
            return Ok(reason);
        }

        let elapsed = tick_start.elapsed();
        if elapsed < frame_duration {
            thread::sleep(frame_duration - elapsed);
        } else {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "Tick overran frame budget");
        }
    }
}
