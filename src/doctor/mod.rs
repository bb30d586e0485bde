//! Doctor command for system diagnostics
//!
//! Health checks for the services and local resources a question needs.

use colored::*;
use std::sync::Arc;

use crate::context::TiktokenEstimator;
use crate::errors::Result;
use crate::rag::retrieval::WeaviateClient;
use crate::streaming::CompletionClient;

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Pass,
    Warn(String),
    Fail(String),
}

/// Individual health check
#[derive(Debug)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
}

impl HealthCheck {
    fn new(name: &str, status: HealthStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
        }
    }
}

/// Doctor diagnostics system
pub struct Doctor {
    search: WeaviateClient,
    completion: Arc<dyn CompletionClient>,
    class_name: String,
    tokenizer_model: String,
    /// (environment variable, value present)
    credentials: Vec<(String, bool)>,
    /// Models the local service reports as installed
    installed_models: Option<Vec<String>>,
}

impl Doctor {
    /// Create a new doctor instance
    pub fn new(
        search: WeaviateClient,
        completion: Arc<dyn CompletionClient>,
        class_name: String,
        tokenizer_model: String,
    ) -> Self {
        Self {
            search,
            completion,
            class_name,
            tokenizer_model,
            credentials: Vec::new(),
            installed_models: None,
        }
    }

    /// Also report whether a credential variable is set
    pub fn with_credential(mut self, env_var: &str, present: bool) -> Self {
        self.credentials.push((env_var.to_string(), present));
        self
    }

    /// Also check the completion model is among `models`
    pub fn with_installed_models(mut self, models: Vec<String>) -> Self {
        self.installed_models = Some(models);
        self
    }

    /// Run all health checks
    pub async fn run_diagnostics(&self) -> Vec<HealthCheck> {
        let mut checks = Vec::new();

        checks.push(self.check_search_live().await);
        checks.push(self.check_search_ready().await);
        checks.push(class_check(self.search.show_classes().await, &self.class_name));
        checks.push(self.check_completion().await);
        if let Some(models) = &self.installed_models {
            checks.push(model_check(models, self.completion.model()));
        }
        checks.push(tokenizer_check(&self.tokenizer_model));
        for (env_var, present) in &self.credentials {
            checks.push(credential_check(env_var, *present));
        }

        checks
    }

    async fn check_search_live(&self) -> HealthCheck {
        match self.search.is_live().await {
            Ok(true) => HealthCheck::new("Search Live", HealthStatus::Pass),
            _ => HealthCheck::new(
                "Search Live",
                HealthStatus::Fail(format!("Cannot reach {}", self.search.base_url())),
            ),
        }
    }

    async fn check_search_ready(&self) -> HealthCheck {
        match self.search.is_ready().await {
            Ok(true) => HealthCheck::new("Search Ready", HealthStatus::Pass),
            _ => HealthCheck::new(
                "Search Ready",
                HealthStatus::Warn("Search service is not ready yet".to_string()),
            ),
        }
    }

    async fn check_completion(&self) -> HealthCheck {
        match self.completion.health_check().await {
            Ok(true) => HealthCheck::new("Completion API", HealthStatus::Pass),
            Ok(false) => HealthCheck::new(
                "Completion API",
                HealthStatus::Fail(format!(
                    "Completion service for {} not reachable",
                    self.completion.model()
                )),
            ),
            Err(e) => HealthCheck::new(
                "Completion API",
                HealthStatus::Fail(format!("Error checking completion service: {}", e)),
            ),
        }
    }

    /// Display diagnostics results
    pub fn display_results(checks: &[HealthCheck]) {
        println!("\n🔍 RagBuddy System Diagnostics\n");
        println!("{:<20} Status", "Check");
        println!("{}", "=".repeat(50));

        for check in checks {
            let message = match &check.status {
                HealthStatus::Pass => "✅ PASS".green(),
                HealthStatus::Warn(msg) => format!("⚠️  WARN: {}", msg).yellow(),
                HealthStatus::Fail(msg) => format!("❌ FAIL: {}", msg).red(),
            };
            println!("{:<20} {}", check.name, message);
        }

        println!();
    }

    /// Get overall health status
    pub fn overall_status(checks: &[HealthCheck]) -> bool {
        !checks.iter().any(|c| matches!(c.status, HealthStatus::Fail(_)))
    }
}

fn class_check(classes: Result<Vec<String>>, class_name: &str) -> HealthCheck {
    match classes {
        Ok(classes) if classes.iter().any(|c| c == class_name) => {
            HealthCheck::new("Index Class", HealthStatus::Pass)
        }
        Ok(classes) => HealthCheck::new(
            "Index Class",
            HealthStatus::Fail(format!(
                "Class {} not found (available: {})",
                class_name,
                if classes.is_empty() { "none".to_string() } else { classes.join(", ") }
            )),
        ),
        Err(e) => HealthCheck::new(
            "Index Class",
            HealthStatus::Fail(format!("Cannot list classes: {}", e)),
        ),
    }
}

fn model_check(installed: &[String], model: &str) -> HealthCheck {
    // Ollama reports `name:tag`; a bare name means `:latest`
    let found = installed
        .iter()
        .any(|m| m == model || m.strip_suffix(":latest") == Some(model));

    if found {
        HealthCheck::new("Model Installed", HealthStatus::Pass)
    } else {
        HealthCheck::new(
            "Model Installed",
            HealthStatus::Fail(format!("{} not installed. Run: ollama pull {}", model, model)),
        )
    }
}

fn tokenizer_check(model: &str) -> HealthCheck {
    match TiktokenEstimator::for_model(model) {
        Ok(_) => HealthCheck::new("Tokenizer", HealthStatus::Pass),
        Err(_) => HealthCheck::new(
            "Tokenizer",
            HealthStatus::Warn(format!(
                "No tiktoken encoding for {}; set budget.tokenizer_repo or accept the heuristic",
                model
            )),
        ),
    }
}

fn credential_check(env_var: &str, present: bool) -> HealthCheck {
    let name = format!("Key {}", env_var);
    if present {
        HealthCheck::new(&name, HealthStatus::Pass)
    } else {
        HealthCheck::new(&name, HealthStatus::Warn(format!("{} is not set", env_var)))
    }
}
