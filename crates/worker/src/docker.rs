//! Docker actions, each a thin wrapper over the `docker` CLI.

use crate::args::Args;
use crate::exec::{run, stderr_or_status, succeeded, ExecError};
use crate::outcome::{fail, fail_with, ActionError, ActionResult};
use engine::detect::{DaemonDownDetector, PhraseDetector, DEFAULT_ENGINE_UNAVAILABLE_MESSAGE};
use engine::traits::{CapturedOutput, CommandSpec};
use engine::AppContext;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOGS_TIMEOUT: Duration = Duration::from_secs(30);
const STATS_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

const NO_LOGS: &str =
    "No logs available for this container. The container may not have produced any output yet.";

pub async fn dispatch(ctx: &AppContext, action: &str, args: &Args) -> ActionResult {
    match action {
        "list_images" => list_json(ctx, &["image", "ls", "--format", "json"]).await,
        "list_containers" => list_json(ctx, &["container", "ls", "-a", "--format", "json"]).await,
        "list_running_containers" => list_json(ctx, &["ps", "--format", "json"]).await,
        "create_dockerfile" => create_dockerfile(&args.text("path"), &args.raw("code")).await,
        "build_image" => build_image(ctx, &args.text("path"), &args.text("tag")).await,
        "stop_container" => stop_container(ctx, &args.text("id")).await,
        "start_container" => start_container(ctx, &args.text("id")).await,
        "create_container" => {
            create_container(
                ctx,
                &args.text("image"),
                args.opt_text("name").as_deref(),
                &args.list("ports"),
                &args.list("env_vars"),
            )
            .await
        }
        "delete_container" => delete_container(ctx, &args.text("id"), args.flag("force")).await,
        "delete_image" => delete_image(ctx, &args.text("id"), args.flag("force")).await,
        "get_container_logs" => {
            let tail = args
                .uint("tail")
                .unwrap_or(engine::actions::DEFAULT_LOG_TAIL as u64);
            get_container_logs(ctx, &args.text("id"), tail).await
        }
        "get_container_stats" => get_container_stats(ctx, &args.text("id")).await,
        "search_dockerhub" => search_dockerhub(ctx, &args.text("name")).await,
        "pull_image" => pull_image(ctx, &args.text("name")).await,
        "search_image_local" => search_image_local(ctx, &args.text("name")).await,
        other => Err(ActionError::UnknownAction(other.to_string())),
    }
}

fn docker<I, S>(args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("docker", args)
}

async fn run_docker(
    ctx: &AppContext,
    cmd: &CommandSpec,
    limit: Option<Duration>,
) -> Result<CapturedOutput, ActionError> {
    run(ctx, cmd, limit).await.map_err(|e| match e {
        ExecError::NotFound(_) => fail("Docker CLI not found. Is Docker installed and in PATH?"),
        ExecError::TimedOut(d) => fail(format!("docker {} timed out after {} seconds", subcommand(cmd), d.as_secs())),
        ExecError::Cap(e) => fail(e.to_string()),
    })
}

fn subcommand(cmd: &CommandSpec) -> &str {
    cmd.args.first().map(String::as_str).unwrap_or("")
}

// Narrower than the bridge defaults: "error response from daemon" prefixes
// ordinary refusals such as removing a running container.
const DAEMON_UNREACHABLE: &[&str] = &[
    "cannot connect to the docker daemon",
    "is the docker daemon running",
    "docker daemon is not running",
    "connection to docker daemon failed",
];

/// Failure for a non-zero docker exit. An unreachable daemon gets the
/// user-facing engine message instead of raw CLI text.
fn command_failure(out: &CapturedOutput, message: String) -> ActionError {
    if PhraseDetector::new(DAEMON_UNREACHABLE).is_daemon_down(&out.stdout, &out.stderr) {
        tracing::warn!(stderr = %out.stderr.trim(), "docker daemon unreachable");
        return fail(DEFAULT_ENGINE_UNAVAILABLE_MESSAGE);
    }
    fail_with(message, stderr_or_status(out))
}

fn require(value: &str, what: &str) -> Result<(), ActionError> {
    if value.is_empty() {
        return Err(fail(format!("No {} given.", what)));
    }
    Ok(())
}

/// One JSON object per line; unparsable lines are skipped.
pub fn parse_json_lines(output: &str) -> Vec<Value> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}

// ===========================================================================
// Listing
// ===========================================================================

async fn list_json(ctx: &AppContext, args: &[&str]) -> ActionResult {
    let cmd = docker(args.iter().copied());
    let out = run_docker(ctx, &cmd, None).await?;
    if !succeeded(&out) {
        return Err(command_failure(&out, format!("Command '{}' failed", cmd.display())));
    }
    Ok(Value::Array(parse_json_lines(&out.stdout)))
}

async fn search_image_local(ctx: &AppContext, name: &str) -> ActionResult {
    let cmd = docker(["images", "--format", "json"]);
    let out = run_docker(ctx, &cmd, None).await?;
    if !succeeded(&out) {
        return Err(command_failure(&out, format!("Command '{}' failed", cmd.display())));
    }
    let needle = name.to_lowercase();
    let matches = parse_json_lines(&out.stdout)
        .into_iter()
        .filter(|img| {
            img.get("Repository")
                .and_then(Value::as_str)
                .is_some_and(|repo| repo.to_lowercase().contains(&needle))
        })
        .collect();
    Ok(Value::Array(matches))
}

// ===========================================================================
// Images
// ===========================================================================

async fn create_dockerfile(path: &str, code: &str) -> ActionResult {
    require(path, "path")?;
    let target = if Path::new(path).is_dir() {
        Path::new(path).join("Dockerfile")
    } else {
        PathBuf::from(path)
    };
    tokio::fs::write(&target, code)
        .await
        .map_err(|e| fail(format!("Could not write {}: {}", target.display(), e)))?;
    let shown = target.display().to_string();
    Ok(json!({
        "message": format!("Dockerfile saved to {}", shown),
        "path": shown,
    }))
}

async fn build_image(ctx: &AppContext, path: &str, tag: &str) -> ActionResult {
    require(path, "path")?;
    require(tag, "tag")?;
    let mut context = PathBuf::from(path);
    // A Dockerfile path builds its directory.
    if context.is_file() {
        context = context
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
    }
    if !context.exists() {
        return Err(fail("Path not found"));
    }

    let cmd = docker(["build".to_string(), "-t".into(), tag.into(), context.display().to_string()]);
    let out = run_docker(ctx, &cmd, None).await?;
    if !succeeded(&out) {
        return Err(command_failure(&out, format!("Failed to build image {}", tag)));
    }
    Ok(json!({
        "message": format!("Image {} built successfully", tag),
        "output": out.stdout,
    }))
}

async fn delete_image(ctx: &AppContext, id: &str, force: bool) -> ActionResult {
    require(id, "image id")?;
    let mut args = vec!["rmi"];
    if force {
        args.push("-f");
    }
    args.push(id);
    let out = run_docker(ctx, &docker(args), None).await?;
    if succeeded(&out) {
        return Ok(json!({
            "message": format!("Image {} deleted", id),
            "output": out.stdout,
        }));
    }

    let err = out.stderr.trim();
    let message = if err.contains("is being used by") || err.contains("is referenced in") {
        format!(
            "Image {} is being used by a container. Stop and remove the container first, or use force delete.",
            id
        )
    } else if err.contains("No such image") || err.to_lowercase().contains("image does not exist") {
        format!("Image {} does not exist.", id)
    } else {
        format!("Failed to delete image {}", id)
    };
    Err(command_failure(&out, message))
}

async fn pull_image(ctx: &AppContext, name: &str) -> ActionResult {
    require(name, "image name")?;
    let out = match run(ctx, &docker(["pull", name]), Some(PULL_TIMEOUT)).await {
        Ok(out) => out,
        Err(ExecError::TimedOut(_)) => {
            return Err(fail(format!(
                "Pulling image {} timed out after 10 minutes. The image might be very large.",
                name
            )))
        }
        Err(ExecError::NotFound(_)) => return Err(fail("Docker CLI not found. Is Docker installed and in PATH?")),
        Err(ExecError::Cap(e)) => return Err(fail(e.to_string())),
    };
    if !succeeded(&out) {
        return Err(command_failure(&out, format!("Failed to pull image {}", name)));
    }
    // Progress goes to stderr.
    let output = if out.stderr.is_empty() { out.stdout } else { out.stderr };
    Ok(json!({
        "message": format!("Image {} pulled successfully", name),
        "output": output,
    }))
}

async fn search_dockerhub(ctx: &AppContext, name: &str) -> ActionResult {
    require(name, "search term")?;
    let timed_out = || fail("Search request timed out");

    let json_cmd = docker(["search", "--format", "json", name]);
    match run_docker(ctx, &json_cmd, Some(SEARCH_TIMEOUT)).await {
        Ok(out) if succeeded(&out) => {
            let results: Vec<Value> = parse_json_lines(&out.stdout)
                .iter()
                .map(search_entry_from_json)
                .collect();
            if !results.is_empty() {
                return Ok(Value::Array(results));
            }
        }
        Ok(_) => {}
        Err(e) if e.to_string().contains("timed out") => return Err(timed_out()),
        Err(e) => return Err(e),
    }

    // Older CLIs: plain table.
    let out = match run_docker(ctx, &docker(["search", name]), Some(SEARCH_TIMEOUT)).await {
        Ok(out) => out,
        Err(e) if e.to_string().contains("timed out") => return Err(timed_out()),
        Err(e) => return Err(e),
    };
    if !succeeded(&out) {
        return Err(command_failure(&out, format!("Failed to search Docker Hub for {}", name)));
    }
    Ok(Value::Array(parse_search_table(&out.stdout)))
}

fn search_entry_from_json(v: &Value) -> Value {
    let field = |k: &str| match v.get(k) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    json!({
        "name": field("Name"),
        "description": field("Description"),
        "star_count": field("StarCount").parse::<u64>().unwrap_or(0),
        "is_official": field("IsOfficial").eq_ignore_ascii_case("true"),
        "is_automated": field("IsAutomated").eq_ignore_ascii_case("true"),
    })
}

/// The plain `docker search` table. Columns are located from the header
/// because the description has spaces and the flag columns may be blank.
pub fn parse_search_table(output: &str) -> Vec<Value> {
    let mut lines = output.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let (Some(desc), Some(stars), Some(official)) = (
        header.find("DESCRIPTION"),
        header.find("STARS"),
        header.find("OFFICIAL"),
    ) else {
        return Vec::new();
    };
    let automated = header.find("AUTOMATED");

    lines
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            json!({
                "name": cell(line, 0, Some(desc)),
                "description": cell(line, desc, Some(stars)),
                "star_count": cell(line, stars, Some(official)).parse::<u64>().unwrap_or(0),
                "is_official": cell(line, official, automated) == "[OK]",
                "is_automated": automated.is_some_and(|a| cell(line, a, None) == "[OK]"),
            })
        })
        .collect()
}

/// Columns are padded by character count, so offsets are char indices.
fn cell(line: &str, start: usize, end: Option<usize>) -> String {
    let chars = line.chars().skip(start);
    let text: String = match end {
        Some(end) => chars.take(end.saturating_sub(start)).collect(),
        None => chars.collect(),
    };
    text.trim().to_string()
}

// ===========================================================================
// Containers
// ===========================================================================

async fn stop_container(ctx: &AppContext, id: &str) -> ActionResult {
    require(id, "container id")?;
    // docker echoes the id on success; it is not part of the result.
    let out = run_docker(ctx, &docker(["stop", id]), None).await?;
    if !succeeded(&out) {
        return Err(command_failure(&out, format!("Failed to stop container {}", id)));
    }
    Ok(json!({ "message": format!("Container {} stopped", id) }))
}

async fn start_container(ctx: &AppContext, id: &str) -> ActionResult {
    require(id, "container id")?;
    let out = run_docker(ctx, &docker(["start", id]), None).await?;
    if !succeeded(&out) {
        return Err(command_failure(&out, format!("Failed to start container {}", id)));
    }
    Ok(json!({ "message": format!("Container {} started", id) }))
}

pub fn create_container_command(
    image: &str,
    name: Option<&str>,
    ports: &[String],
    env_vars: &[String],
) -> CommandSpec {
    let mut args = vec!["create".to_string()];
    if let Some(name) = name {
        args.extend(["--name".to_string(), name.to_string()]);
    }
    for p in ports {
        args.extend(["-p".to_string(), p.clone()]);
    }
    for e in env_vars {
        args.extend(["-e".to_string(), e.clone()]);
    }
    args.push(image.to_string());
    docker(args)
}

async fn create_container(
    ctx: &AppContext,
    image: &str,
    name: Option<&str>,
    ports: &[String],
    env_vars: &[String],
) -> ActionResult {
    require(image, "image")?;
    let out = run_docker(ctx, &create_container_command(image, name, ports, env_vars), None).await?;
    if !succeeded(&out) {
        return Err(command_failure(&out, format!("Failed to create container from {}", image)));
    }
    Ok(json!({
        "message": "Container created",
        "container_id": out.stdout.trim(),
    }))
}

async fn delete_container(ctx: &AppContext, id: &str, force: bool) -> ActionResult {
    require(id, "container id")?;
    let mut args = vec!["rm"];
    if force {
        args.push("-f");
    }
    args.push(id);
    let out = run_docker(ctx, &docker(args), None).await?;
    if succeeded(&out) {
        return Ok(json!({ "message": format!("Container {} deleted", id) }));
    }

    let err = out.stderr.trim();
    let lower = err.to_lowercase();
    let message = if lower.contains("is running") {
        format!("Container {} is running. Stop it first or use force delete.", id)
    } else if err.contains("No such container") || lower.contains("container does not exist") {
        format!("Container {} does not exist.", id)
    } else {
        format!("Failed to delete container {}", id)
    };
    Err(command_failure(&out, message))
}

async fn get_container_logs(ctx: &AppContext, id: &str, tail: u64) -> ActionResult {
    require(id, "container id")?;
    let cmd = docker(["logs".to_string(), "--tail".into(), tail.to_string(), id.to_string()]);
    let out = match run(ctx, &cmd, Some(LOGS_TIMEOUT)).await {
        Ok(out) => out,
        Err(ExecError::TimedOut(_)) => return Err(fail("Logs request timed out after 30 seconds")),
        Err(ExecError::NotFound(_)) => return Err(fail("Docker CLI not found. Is Docker installed and in PATH?")),
        Err(ExecError::Cap(e)) => return Err(fail(e.to_string())),
    };
    logs_from_output(id, &out)
}

/// Logs live on stdout, but containers that write to stderr show up there.
/// Non-zero exits still return whatever logs came back.
pub fn logs_from_output(id: &str, out: &CapturedOutput) -> ActionResult {
    if !out.stdout.trim().is_empty() {
        return Ok(json!({ "logs": out.stdout }));
    }

    let err = out.stderr.trim();
    let lower = err.to_lowercase();
    let looks_like_error = ["error", "no such container", "container does not exist", "cannot connect"]
        .iter()
        .any(|k| lower.contains(k));
    if !err.is_empty() && !looks_like_error {
        return Ok(json!({ "logs": err }));
    }

    if !succeeded(out) {
        if err.contains("No such container") || lower.contains("container does not exist") {
            return Err(fail(format!("Container {} not found", id)));
        }
        let message = if err.is_empty() { "Unknown error".to_string() } else { err.to_string() };
        return Err(command_failure(out, message));
    }

    Ok(json!({ "logs": NO_LOGS }))
}

async fn get_container_stats(ctx: &AppContext, id: &str) -> ActionResult {
    require(id, "container id")?;
    let cmd = docker(["stats", "--no-stream", "--format", "json", id]);
    let out = match run(ctx, &cmd, Some(STATS_TIMEOUT)).await {
        Ok(out) => out,
        Err(ExecError::TimedOut(_)) => return Err(fail("Stats request timed out after 10 seconds")),
        Err(ExecError::NotFound(_)) => return Err(fail("Docker CLI not found. Is Docker installed and in PATH?")),
        Err(ExecError::Cap(e)) => return Err(fail(e.to_string())),
    };
    stats_from_output(id, &out)
}

pub fn stats_from_output(id: &str, out: &CapturedOutput) -> ActionResult {
    if succeeded(out) {
        let Some(first) = out.stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Err(fail("No stats available - container may not be running"));
        };
        return match serde_json::from_str::<Map<String, Value>>(first) {
            Ok(stats) => Ok(json!({ "stats": stats })),
            Err(e) => Err(fail_with(format!("Failed to parse stats JSON: {}", e), first)),
        };
    }

    let err = out.stderr.trim();
    let lower = err.to_lowercase();
    if err.contains("No such container") || lower.contains("container does not exist") {
        Err(fail(format!("Container {} not found", id)))
    } else if lower.contains("is not running") || lower.contains("is not started") {
        Err(fail("Container is not running. Stats are only available for running containers."))
    } else {
        let message = if err.is_empty() { "Unknown error".to_string() } else { err.to_string() };
        Err(command_failure(out, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn test_parse_json_lines_skips_garbage() {
        let out = "{\"ID\":\"a\"}\nnot json\n\n{\"ID\":\"b\"}\n";
        let v = parse_json_lines(out);
        assert_eq!(v, vec![json!({"ID": "a"}), json!({"ID": "b"})]);
    }

    fn search_table(rows: &[(&str, &str, &str, &str, &str)]) -> String {
        let mut out = format!(
            "{:<16}{:<32}{:<8}{:<10}{}\n",
            "NAME", "DESCRIPTION", "STARS", "OFFICIAL", "AUTOMATED"
        );
        for (name, desc, stars, official, automated) in rows {
            out.push_str(&format!(
                "{:<16}{:<32}{:<8}{:<10}{}\n",
                name, desc, stars, official, automated
            ));
        }
        out
    }

    #[test]
    fn test_parse_search_table() {
        let out = search_table(&[
            ("nginx", "Official build of Nginx.", "20000", "[OK]", ""),
            ("bitnami/nginx", "Bitnami nginx Docker Image", "180", "", "[OK]"),
        ]);
        let v = parse_search_table(&out);
        assert_eq!(v.len(), 2);
        assert_eq!(v[0]["name"], "nginx");
        assert_eq!(v[0]["description"], "Official build of Nginx.");
        assert_eq!(v[0]["star_count"], 20000);
        assert_eq!(v[0]["is_official"], true);
        assert_eq!(v[0]["is_automated"], false);
        assert_eq!(v[1]["name"], "bitnami/nginx");
        assert_eq!(v[1]["is_official"], false);
        assert_eq!(v[1]["is_automated"], true);
    }

    #[test]
    fn test_parse_search_table_non_ascii_description() {
        let out = search_table(&[
            ("cafe/app", "Café déjà vu ✓ image", "42", "[OK]", "[OK]"),
            ("next", "plain", "7", "", ""),
        ]);
        let v = parse_search_table(&out);
        assert_eq!(v[0]["name"], "cafe/app");
        assert_eq!(v[0]["description"], "Café déjà vu ✓ image");
        assert_eq!(v[0]["star_count"], 42);
        assert_eq!(v[0]["is_official"], true);
        assert_eq!(v[0]["is_automated"], true);
        assert_eq!(v[1]["star_count"], 7);
    }

    #[test]
    fn test_search_entry_from_json_normalizes() {
        let e = search_entry_from_json(&json!({
            "Name": "alpine", "Description": "tiny", "StarCount": "11000",
            "IsOfficial": "true", "IsAutomated": "false"
        }));
        assert_eq!(e, json!({
            "name": "alpine", "description": "tiny", "star_count": 11000,
            "is_official": true, "is_automated": false
        }));
    }

    #[test]
    fn test_logs_prefer_stdout_then_plain_stderr() {
        let r = logs_from_output("c", &output("line 1\n", "", Some(0))).unwrap();
        assert_eq!(r["logs"], "line 1\n");

        let r = logs_from_output("c", &output("", "nginx: worker started", Some(0))).unwrap();
        assert_eq!(r["logs"], "nginx: worker started");

        let r = logs_from_output("c", &output("", "", Some(0))).unwrap();
        assert_eq!(r["logs"], NO_LOGS);

        let e = logs_from_output("c", &output("", "Error: No such container: c", Some(1))).unwrap_err();
        assert_eq!(e.to_string(), "Container c not found");
    }

    #[test]
    fn test_stats_not_running() {
        let e = stats_from_output("c", &output("", "Error: container c is not running", Some(1))).unwrap_err();
        assert!(e.to_string().starts_with("Container is not running"));

        let ok = stats_from_output("c", &output("{\"CPUPerc\":\"0.5%\"}\n", "", Some(0))).unwrap();
        assert_eq!(ok["stats"]["CPUPerc"], "0.5%");
    }

    #[test]
    fn test_create_container_command_layout() {
        let cmd = create_container_command("nginx", Some("web"), &["8080:80".into()], &["A=1".into()]);
        assert_eq!(cmd.args, vec!["create", "--name", "web", "-p", "8080:80", "-e", "A=1", "nginx"]);
    }

    #[tokio::test]
    async fn test_list_images_parses_lines() {
        let (ctx, calls) = fake_context(vec![output(
            "{\"Repository\":\"nginx\"}\n{\"Repository\":\"redis\"}\n",
            "",
            Some(0),
        )]);
        let r = dispatch(&ctx, "list_images", &Args::default()).await.unwrap();
        assert_eq!(r.as_array().unwrap().len(), 2);
        assert_eq!(calls.lock().unwrap()[0].args, vec!["image", "ls", "--format", "json"]);
    }

    #[tokio::test]
    async fn test_daemon_down_gets_engine_message() {
        let (ctx, _) = fake_context(vec![output(
            "",
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?",
            Some(1),
        )]);
        let e = dispatch(&ctx, "list_containers", &Args::default()).await.unwrap_err();
        assert_eq!(e.to_string(), DEFAULT_ENGINE_UNAVAILABLE_MESSAGE);
    }

    #[tokio::test]
    async fn test_delete_running_container_is_explained() {
        let (ctx, calls) = fake_context(vec![output(
            "",
            "Error response from daemon: cannot remove container \"/web\": container is running: stop the container before removing or force remove",
            Some(1),
        )]);
        let args = Args::parse(Some(r#"{"id":"web","force":false}"#)).unwrap();
        let e = dispatch(&ctx, "delete_container", &args).await.unwrap_err();
        match e {
            ActionError::Failed { message, details } => {
                assert_eq!(message, "Container web is running. Stop it first or use force delete.");
                assert!(details.unwrap().contains("container is running"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(calls.lock().unwrap()[0].args, vec!["rm", "web"]);
    }

    #[tokio::test]
    async fn test_search_falls_back_to_table() {
        let (ctx, calls) = fake_context(vec![
            output("", "unknown flag: --format", Some(125)),
            output(&search_table(&[("alpine", "small", "100", "[OK]", "")]), "", Some(0)),
        ]);
        let args = Args::parse(Some(r#"{"name":"alpine"}"#)).unwrap();
        let r = dispatch(&ctx, "search_dockerhub", &args).await.unwrap();
        assert_eq!(r[0]["name"], "alpine");
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_cli_and_unknown_action() {
        let (ctx, _) = fake_context(vec![]);
        let e = dispatch(&ctx, "list_images", &Args::default()).await.unwrap_err();
        assert!(e.to_string().contains("Docker CLI not found"));

        let e = dispatch(&ctx, "dance", &Args::default()).await.unwrap_err();
        assert_eq!(e.to_string(), "Unknown action: dance");
    }

    #[tokio::test]
    async fn test_required_arguments() {
        let (ctx, calls) = fake_context(vec![]);
        let e = dispatch(&ctx, "stop_container", &Args::default()).await.unwrap_err();
        assert_eq!(e.to_string(), "No container id given.");
        assert!(calls.lock().unwrap().is_empty());
    }
}
