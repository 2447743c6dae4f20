use common::parallel::{chunk_count, par_chunks_mut_while};

use crate::data::DataType;
use crate::operator::{Operator, OperatorContext, Outcome, SocketDef};

/// Applies `f(index, value)` to every element over the worker pool. Each
/// chunk polls for interruption and reports an equal share of progress.
/// Returns `false` if the fan-out stopped early.
fn par_map_in_place<F>(ctx: &OperatorContext<'_>, values: &mut [f64], f: F) -> bool
where
    F: Fn(usize, f64) -> f64 + Sync,
{
    let chunk_size = ctx.parallel_chunk_size().max(1);
    let share = 100.0 / chunk_count(values.len(), chunk_size).max(1) as f32;

    let exec = ctx.execution_context();
    par_chunks_mut_while(values, chunk_size, |offset, chunk| {
        if exec.interrupted() {
            return false;
        }
        for (i, value) in chunk.iter_mut().enumerate() {
            *value = f(offset + i, *value);
        }
        exec.coordinator().report_parallel_progress(share);
        true
    })
}

/// `[0, 1, .., count - 1]` as floats, filled in parallel.
#[derive(Debug, Default)]
pub struct Range;

impl Range {
    pub const TYPE_NAME: &'static str = "range";
}

impl Operator for Range {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn outputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("values", DataType::FloatArray)]
    }

    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome {
        let count = ctx
            .parameter("count")
            .and_then(|count| count.as_i64())
            .unwrap_or(0);
        if count < 0 {
            return Outcome::failure("count must not be negative");
        }

        let mut values = vec![0.0; count as usize];
        if !par_map_in_place(ctx, &mut values, |i, _| i as f64) {
            return Outcome::failure("interrupted");
        }
        ctx.set_output(0, values);
        Outcome::Success
    }
}

/// Multiplies every element by `factor`, fanned out over chunks on the
/// worker pool.
#[derive(Debug, Default)]
pub struct ScaleArray;

impl ScaleArray {
    pub const TYPE_NAME: &'static str = "scale_array";
}

impl Operator for ScaleArray {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn inputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("values", DataType::FloatArray)]
    }

    fn outputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("values", DataType::FloatArray)]
    }

    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome {
        let Some(input) = ctx.input(0).as_floats() else {
            return Outcome::failure("missing input 'values'");
        };
        let factor = ctx
            .parameter("factor")
            .and_then(|factor| factor.as_f64())
            .unwrap_or(1.0);

        let mut values: Vec<f64> = input.as_ref().clone();
        let completed = par_map_in_place(ctx, &mut values, |_, value| value * factor);

        if !completed {
            return Outcome::failure("interrupted");
        }

        ctx.set_output(0, values);
        Outcome::Success
    }
}
