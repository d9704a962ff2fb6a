//! Tool layer: the backend's generic agent tools (schema-driven parameters) and the fixed
//! wellness endpoints.

mod generic;
mod wellness;

pub use generic::{
    build_parameters, coerce_parameter, ParameterSchema, Tool, ToolConsole, ToolError,
    ToolParameters,
};
pub use wellness::{WellnessRequest, WellnessTool};
