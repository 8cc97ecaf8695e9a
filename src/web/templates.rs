use crate::chart::render::CHART_TEMPLATE;
use minijinja::Environment;

/// Template environment with the embedded chart fragment registered.
pub fn init_templates() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();

    env.add_template(CHART_TEMPLATE, include_str!("../../templates/chart.html"))?;

    Ok(env)
}
