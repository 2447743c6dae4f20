use crate::data::DataType;
use crate::operator::{Operator, OperatorContext, Outcome, Parameters, SocketDef, TimeStep};

/// Current frame and time in seconds.
#[derive(Debug, Default)]
pub struct Time;

impl Time {
    pub const TYPE_NAME: &'static str = "time";
}

impl Operator for Time {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn outputs(&self) -> Vec<SocketDef> {
        vec![
            SocketDef::new("frame", DataType::Int),
            SocketDef::new("seconds", DataType::Float),
        ]
    }

    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome {
        let frame = ctx.frame();
        let seconds = ctx.seconds();
        ctx.set_output(0, frame);
        ctx.set_output(1, seconds);
        Outcome::Success
    }

    fn depends_on_time(&self) -> bool {
        true
    }
}

/// Linear interpolation over `keys`, a flat `[frame, value, frame, value..]`
/// list sorted by frame. Clamps outside the keyed range.
#[derive(Debug, Default)]
pub struct Keyframes;

impl Keyframes {
    pub const TYPE_NAME: &'static str = "keyframes";

    fn keys(parameters: &Parameters) -> Option<&[f64]> {
        parameters.get("keys").and_then(|keys| keys.as_floats())
    }

    fn sample(keys: &[f64], frame: f64) -> f64 {
        let pairs: Vec<(f64, f64)> = keys.chunks_exact(2).map(|kv| (kv[0], kv[1])).collect();

        let (first, last) = (pairs[0], pairs[pairs.len() - 1]);
        if frame <= first.0 {
            return first.1;
        }
        if frame >= last.0 {
            return last.1;
        }

        pairs
            .windows(2)
            .find(|w| frame >= w[0].0 && frame <= w[1].0)
            .map(|w| {
                let span = w[1].0 - w[0].0;
                if span.abs() < common::EPSILON {
                    w[1].1
                } else {
                    let t = (frame - w[0].0) / span;
                    w[0].1 + (w[1].1 - w[0].1) * t
                }
            })
            .unwrap_or(last.1)
    }
}

impl Operator for Keyframes {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn outputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("value", DataType::Float)]
    }

    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome {
        let Some(keys) = Self::keys(ctx.parameters()) else {
            return Outcome::failure("no keys");
        };
        if keys.is_empty() || keys.len() % 2 != 0 {
            return Outcome::failure("keys must be frame/value pairs");
        }

        let value = Self::sample(keys, ctx.frame() as f64);
        ctx.set_output(0, value);
        Outcome::Success
    }

    /// Animated once there are at least two keys.
    fn has_animation(&self, parameters: &Parameters) -> bool {
        Self::keys(parameters).is_some_and(|keys| keys.len() >= 4)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct AccumulatorState {
    base: f64,
    total: f64,
    stepped: bool,
}

/// Simulation-style integrator: adds `rate` to a running total once per
/// frame. Starts over from `initial` whenever time is discontinuous.
#[derive(Debug, Default)]
pub struct Accumulate;

impl Accumulate {
    pub const TYPE_NAME: &'static str = "accumulate";
}

impl Operator for Accumulate {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn inputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("rate", DataType::Float)]
    }

    fn outputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("total", DataType::Float)]
    }

    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome {
        let rate = ctx.input(0).as_f64().unwrap_or(0.0);
        let initial = ctx
            .parameter("initial")
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0);
        let time_step = ctx.time_step();

        let state = ctx.state().get_or_default::<AccumulatorState>();
        match time_step {
            TimeStep::Reset => {
                *state = AccumulatorState {
                    base: initial,
                    total: initial,
                    stepped: false,
                };
            }
            TimeStep::Advance => {
                state.base = state.total;
                state.total = state.base + rate;
                state.stepped = true;
            }
            // Same frame again: redo this frame's step with the current rate.
            TimeStep::Hold => {
                if state.stepped {
                    state.total = state.base + rate;
                }
            }
        }

        let total = state.total;
        ctx.set_output(0, total);
        Outcome::Success
    }

    fn depends_on_time(&self) -> bool {
        true
    }
}
