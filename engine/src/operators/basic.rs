use crate::data::{DataType, DynamicValue};
use crate::operator::{Operator, OperatorContext, Outcome, SocketDef};

/// Emits its `value` parameter.
#[derive(Debug, Default)]
pub struct Constant;

impl Constant {
    pub const TYPE_NAME: &'static str = "constant";
}

impl Operator for Constant {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn outputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("value", DataType::Any)]
    }

    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome {
        let value = ctx
            .parameter("value")
            .map(DynamicValue::from)
            .unwrap_or(DynamicValue::Float(0.0));
        ctx.set_output(0, value);
        Outcome::Success
    }
}

/// Sums every value linked into `values`.
#[derive(Debug, Default)]
pub struct Add;

impl Add {
    pub const TYPE_NAME: &'static str = "add";
}

impl Operator for Add {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn inputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::multi("values", DataType::Float)]
    }

    fn outputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("sum", DataType::Float)]
    }

    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome {
        let mut sum = ctx
            .parameter("offset")
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0);

        for value in ctx.input_values(0) {
            match value.as_f64() {
                Some(value) => sum += value,
                None => return Outcome::failure(format!("cannot add {:?}", value)),
            }
        }

        ctx.set_output(0, sum);
        Outcome::Success
    }
}

/// `value * factor`, where `factor` is a parameter defaulting to 1.
#[derive(Debug, Default)]
pub struct Multiply;

impl Multiply {
    pub const TYPE_NAME: &'static str = "multiply";
}

impl Operator for Multiply {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn inputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("value", DataType::Float)]
    }

    fn outputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("product", DataType::Float)]
    }

    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome {
        let Some(value) = ctx.input(0).as_f64() else {
            return Outcome::failure("missing input 'value'");
        };
        let factor = ctx
            .parameter("factor")
            .and_then(|factor| factor.as_f64())
            .unwrap_or(1.0);

        ctx.set_output(0, value * factor);
        Outcome::Success
    }
}
