use std::path::Path;

use crate::data::DataType;
use crate::operator::{Operator, OperatorContext, Outcome, SocketDef};

/// Byte length of the file at the `path` parameter, read through the
/// context's file manager.
#[derive(Debug, Default)]
pub struct FileSize;

impl FileSize {
    pub const TYPE_NAME: &'static str = "file_size";
}

impl Operator for FileSize {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn outputs(&self) -> Vec<SocketDef> {
        vec![SocketDef::new("bytes", DataType::Int)]
    }

    fn execute(&mut self, ctx: &mut OperatorContext<'_>) -> Outcome {
        let Some(path) = ctx.parameter("path").and_then(|path| path.as_str()) else {
            return Outcome::failure("no path");
        };

        match ctx.files().load(Path::new(path)) {
            Ok(bytes) => {
                ctx.set_output(0, bytes.len() as i64);
                Outcome::Success
            }
            Err(err) => Outcome::failure(format!("cannot read '{}': {}", path, err)),
        }
    }
}
