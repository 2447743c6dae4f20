use crate::data::DataType;
use crate::network::{DependencyCompilationError, DependencyCompiler, NetworkNodeId};
use crate::operator::{Operator, OperatorContext, Outcome, Parameters, SocketDef};

/// Reads another entity's result. The `entity` parameter names the source,
/// `socket` selects its output socket.
#[derive(Debug, Default)]
pub struct ImportEntity;

impl ImportEntity {
    pub const TYPE_NAME: &'static str = "import";

    fn source(parameters: &Parameters) -> Option<&str> {
        parameters.get("entity").and_then(|name| name.as_str())
    }
}

impl Operator for ImportEntity {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn outputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("value", DataType::Any)]
    }

    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome {
        let Some(source) = Self::source(ctx.parameters()) else {
            return Outcome::failure("no source entity");
        };
        let socket = ctx
            .parameter("socket")
            .and_then(|socket| socket.as_i64())
            .unwrap_or(0)
            .max(0) as usize;

        let Some(entity) = ctx.entities().by_name(source) else {
            return Outcome::failure(format!("entity '{}' not found", source));
        };
        let Some(value) = entity.output_value(socket) else {
            return Outcome::failure(format!("entity '{}' has no result", source));
        };

        ctx.set_output(0, value);
        Outcome::Success
    }

    fn declare_dependencies(
        &self,
        parameters: &Parameters,
        compiler: &mut DependencyCompiler<'_>,
        network_node: NetworkNodeId,
    ) -> Result<(), DependencyCompilationError> {
        match Self::source(parameters) {
            Some(source) => compiler.depend_on_entity(source, network_node),
            None => Ok(()),
        }
    }
}
