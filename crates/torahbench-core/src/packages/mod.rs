//! Packages bundled with the harness.

pub mod anthropic;
pub mod dicta;
pub mod http_target;
pub mod simple_template;
pub mod sofer_ai;
pub mod toraheval;

use std::sync::Arc;

use crate::loader::PluginRegistry;
use crate::module::{EvaluationModule, Implementation};

pub use http_target::HttpTarget;

pub(crate) fn register_builtin(registry: &mut PluginRegistry) {
    registry.register_evaluation(toraheval::NAME, |ctx| {
        Ok(Arc::new(toraheval::TorahEval::for_package(ctx.package_dir)) as Arc<dyn EvaluationModule>)
    });

    registry
        .register_implementation(toraheval::NAME, sofer_ai::NAME, |_| {
            Ok(Arc::new(sofer_ai::SoferAi) as Arc<dyn Implementation>)
        })
        .register_implementation(toraheval::NAME, dicta::NAME, |_| {
            Ok(Arc::new(dicta::Dicta) as Arc<dyn Implementation>)
        })
        .register_implementation(toraheval::NAME, simple_template::NAME, |_| {
            Ok(Arc::new(simple_template::SimpleTemplate) as Arc<dyn Implementation>)
        })
        .register_implementation(toraheval::NAME, anthropic::NAME, |ctx| {
            Ok(Arc::new(anthropic::AnthropicDirect::from_config(&ctx.config.anthropic)?) as Arc<dyn Implementation>)
        })
        .register_implementation(toraheval::NAME, "anthropic-api", |ctx| {
            let target = HttpTarget::new("anthropic-api", "Anthropic API server", &ctx.config.targets.anthropic_api)?;
            Ok(Arc::new(target) as Arc<dyn Implementation>)
        })
        .register_implementation(toraheval::NAME, "ituria-api", |ctx| {
            let target = HttpTarget::new("ituria-api", "Ituria API server", &ctx.config.targets.ituria_api)?;
            Ok(Arc::new(target) as Arc<dyn Implementation>)
        });
}
