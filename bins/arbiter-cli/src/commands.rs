// CLI commands for operating Arbiter
use anyhow::{anyhow, bail, Context, Result};
use arbiter_common::redis::problem_key;
use arbiter_common::types::{EvaluateRequest, RunResponse, SubmitResponse};
use arbiter_common::Problem;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

const LANGUAGES_PATH: &str = "config/languages.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub id: String,
    pub display_name: String,
    pub runtime_id: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LanguagesJson {
    pub languages: Vec<LanguageEntry>,
}

/// Where and as whom to evaluate a source file
#[derive(Debug, Args)]
pub struct Target {
    /// Problem id
    #[arg(short, long)]
    pub problem: String,

    /// Language id (e.g., cpp, java, javascript)
    #[arg(short, long)]
    pub language: String,

    /// Source file to send
    #[arg(short, long)]
    pub file: String,

    /// User id sent as X-User-Id
    #[arg(short, long, default_value = "cli")]
    pub user: String,

    /// API base URL
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    pub api: String,
}

/// Load languages configuration
fn load_languages_config() -> Result<LanguagesJson> {
    let config_path = Path::new(LANGUAGES_PATH);
    if !config_path.exists() {
        return Ok(LanguagesJson::default());
    }

    let content = fs::read_to_string(config_path).context("Failed to read languages.json")?;
    serde_json::from_str(&content).context("Failed to parse languages.json")
}

/// Save languages configuration
fn save_languages_config(config: &LanguagesJson) -> Result<()> {
    let config_path = Path::new(LANGUAGES_PATH);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json_content =
        serde_json::to_string_pretty(&config).context("Failed to serialize languages.json")?;

    fs::write(config_path, json_content).context("Failed to write languages.json")?;

    Ok(())
}

/// Build a new entry, refusing ids that would collide in the registry
fn new_language_entry(
    languages: &LanguagesJson,
    name: &str,
    display_name: &str,
    runtime_id: u32,
) -> Result<LanguageEntry> {
    let id = name.trim().to_lowercase();
    if id.is_empty() || display_name.trim().is_empty() {
        bail!("Language id and display name cannot be empty");
    }

    if languages.languages.iter().any(|l| l.id == id) {
        bail!("Language '{}' already exists in config", id);
    }
    if let Some(existing) = languages
        .languages
        .iter()
        .find(|l| l.display_name.eq_ignore_ascii_case(display_name.trim()))
    {
        bail!(
            "Display name '{}' is already used by '{}'",
            display_name,
            existing.id
        );
    }

    Ok(LanguageEntry {
        id,
        display_name: display_name.trim().to_string(),
        runtime_id,
    })
}

/// Add a language to the registry file
pub async fn add_language(name: &str, display_name: &str, runtime_id: u32) -> Result<()> {
    println!("🚀 Adding language: {}", name);

    let mut languages_json = load_languages_config()?;
    let entry = new_language_entry(&languages_json, name, display_name, runtime_id)?;
    let id = entry.id.clone();
    languages_json.languages.push(entry);

    println!("📝 Updating {}...", LANGUAGES_PATH);
    save_languages_config(&languages_json)?;

    println!("✅ Language '{}' added successfully!", id);
    println!("\n📋 Next steps:");
    println!("  1. Add a \"{}\" entry to each problem's startCode", display_name);
    println!("  2. Restart arbiter-api so it reloads {}", LANGUAGES_PATH);

    Ok(())
}

/// Remove a language from the registry file
pub async fn remove_language(name: &str, yes: bool) -> Result<()> {
    println!("🗑️  Removing language: {}", name);

    let mut languages_json = load_languages_config()?;

    let lang_index = languages_json
        .languages
        .iter()
        .position(|l| l.id == name)
        .ok_or_else(|| anyhow!("Language '{}' not found in config", name))?;

    if !yes {
        print!("⚠️  Submissions in '{}' will be refused after the next restart.\n", name);
        print!("\nContinue? (y/N): ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("❌ Aborted");
            return Ok(());
        }
    }

    languages_json.languages.remove(lang_index);
    println!("📝 Removing from {}...", LANGUAGES_PATH);
    save_languages_config(&languages_json)?;

    println!("✅ Language '{}' removed successfully!", name);

    Ok(())
}

/// List all configured languages
pub async fn list_languages() -> Result<()> {
    let languages_json = load_languages_config()?;

    if languages_json.languages.is_empty() {
        println!("No languages configured.");
        println!("\n💡 Add a language with: arbiter-cli add-lang --name <id> --display-name <name> --runtime-id <id>");
        return Ok(());
    }

    println!("📋 Configured Languages:\n");
    println!("{:<14} {:<16} {:<10}", "Id", "Display Name", "Runtime");
    println!("{}", "─".repeat(42));

    for lang in &languages_json.languages {
        println!("{:<14} {:<16} {:<10}", lang.id, lang.display_name, lang.runtime_id);
    }

    println!("\n✅ Total: {} language(s)", languages_json.languages.len());

    Ok(())
}

/// Accept either a single problem object or an array of them
fn parse_problems(content: &str) -> Result<Vec<Problem>> {
    let value: serde_json::Value =
        serde_json::from_str(content).context("Problem file is not valid JSON")?;

    let problems: Vec<Problem> = if value.is_array() {
        serde_json::from_value(value).context("Failed to parse problem list")?
    } else {
        vec![serde_json::from_value(value).context("Failed to parse problem")?]
    };

    for problem in &problems {
        if problem.id.trim().is_empty() {
            bail!("Problem with title '{}' has no id", problem.title);
        }
        if problem.visible_test_cases.is_empty() && problem.hidden_test_cases.is_empty() {
            bail!("Problem '{}' has no test cases", problem.id);
        }
    }

    Ok(problems)
}

/// Write problems into the Redis problem store
pub async fn load_problem(file: &str, redis_url: Option<&str>) -> Result<()> {
    let content = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?;
    let problems = parse_problems(&content)?;

    let redis_url = redis_url
        .map(str::to_string)
        .or_else(|| std::env::var("REDIS_URL").ok())
        .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

    println!("🔌 Connecting to {}...", redis_url);
    let client = redis::Client::open(redis_url.as_str()).context("Invalid Redis URL")?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .context("Failed to connect to Redis")?;

    for problem in &problems {
        let json = serde_json::to_string(problem)?;
        redis::cmd("SET")
            .arg(problem_key(&problem.id))
            .arg(json)
            .query_async::<_, ()>(&mut conn)
            .await
            .with_context(|| format!("Failed to store problem '{}'", problem.id))?;
        println!(
            "  ✅ {} ({} visible, {} hidden)",
            problem.id,
            problem.visible_test_cases.len(),
            problem.hidden_test_cases.len()
        );
    }

    println!("\n✅ Loaded {} problem(s)", problems.len());

    Ok(())
}

/// POST the source file to one of the evaluation endpoints
async fn evaluate(target: &Target, mode: &str) -> Result<reqwest::Response> {
    let code = fs::read_to_string(&target.file)
        .with_context(|| format!("Failed to read {}", target.file))?;

    let url = format!(
        "{}/submission/{}/{}",
        target.api.trim_end_matches('/'),
        mode,
        target.problem
    );
    let body = EvaluateRequest {
        language: target.language.clone(),
        code,
    };

    println!("📤 {} {} as {}...", mode, target.problem, target.user);
    let response = reqwest::Client::new()
        .post(&url)
        .header("X-User-Id", &target.user)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    if !response.status().is_success() {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        match retry_after {
            Some(secs) => bail!("{} (retry after {}s): {}", status, secs, body),
            None => bail!("{}: {}", status, body),
        }
    }

    Ok(response)
}

/// Run against the visible cases and print every case
pub async fn run_code(target: &Target) -> Result<()> {
    let response: RunResponse = evaluate(target, "run")
        .await?
        .json()
        .await
        .context("Failed to parse run response")?;

    println!("\n{:<6} {:<22} {:>10} {:>10}", "Case", "Status", "Time (s)", "Mem (KB)");
    println!("{}", "─".repeat(52));
    for case in &response.test_cases {
        println!(
            "{:<6} {:<22} {:>10.3} {:>10}",
            case.index,
            case.status.as_str(),
            case.runtime,
            case.memory
        );
        if !case.status.is_code_failure() {
            continue;
        }
        println!("       input:    {}", case.stdin.trim_end());
        println!("       expected: {}", case.expected_output.trim_end());
        if let Some(stdout) = &case.stdout {
            println!("       got:      {}", stdout.trim_end());
        }
        if let Some(diagnostics) = &case.diagnostics {
            println!("       {}", diagnostics.trim_end());
        }
    }

    println!("\n{}", summary_line(response.success, response.error.map(|e| e.as_str())));
    println!("   runtime {:.3}s, memory {} KB", response.runtime, response.memory);

    Ok(())
}

/// Submit against every case and print the aggregate
pub async fn submit_code(target: &Target) -> Result<()> {
    let response: SubmitResponse = evaluate(target, "submit")
        .await?
        .json()
        .await
        .context("Failed to parse submit response")?;

    println!("\n🆔 Submission {}", response.submission_id);
    println!(
        "{}",
        summary_line(response.accepted, response.error.map(|e| e.as_str()))
    );
    println!(
        "   passed {}/{}, runtime {:.3}s, memory {} KB",
        response.passed_test_cases, response.total_test_cases, response.runtime, response.memory
    );
    if response.first_solve {
        println!("🏆 First solve!");
    }

    Ok(())
}

fn summary_line(accepted: bool, error: Option<&str>) -> String {
    if accepted {
        "✅ Accepted".to_string()
    } else {
        format!("❌ {}", error.unwrap_or("failed"))
    }
}
