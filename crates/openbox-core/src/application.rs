//! Applications
//!
//! An application is a named set of statements plus lifecycle hooks. The
//! framework calls `handle_app_start` once, deploys every statement, then
//! calls `handle_instance_up` for each deployed instance.

use crate::deploy::Deployer;
use crate::error::Result;
use crate::statement::Statement;
use crate::topology::Location;
use serde::Serialize;

/// Facts about a freshly deployed instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceInfo {
    pub app: String,
    pub location: Location,
    pub root: String,
    pub blocks: usize,
}

pub trait BoxApplication {
    fn name(&self) -> &str;

    /// Build the statements to deploy
    fn statements(&mut self) -> Result<Vec<Statement>>;

    fn handle_app_start(&mut self) {}

    fn handle_instance_up(&mut self, _instance: &InstanceInfo) {}
}

/// Start an application and deploy all of its statements
pub fn launch<A, D>(app: &mut A, deployer: &mut D) -> Result<Vec<D::Handle>>
where
    A: BoxApplication + ?Sized,
    D: Deployer,
{
    app.handle_app_start();

    let statements = app.statements()?;
    let mut handles = Vec::with_capacity(statements.len());

    for statement in statements {
        let info = InstanceInfo {
            app: app.name().to_string(),
            location: statement.location().clone(),
            root: statement.graph().root_name().to_string(),
            blocks: statement.graph().len(),
        };
        handles.push(deployer.deploy(statement)?);
        app.handle_instance_up(&info);
    }

    tracing::info!(app = app.name(), instances = handles.len(), "Application launched");
    Ok(handles)
}
