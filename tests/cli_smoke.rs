use std::process::Command;

use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn records() -> serde_json::Value {
    json!([
        {
            "title": "Short", "url": "https://archiveofourown.org/works/1",
            "fandoms": ["F"], "rating": "General Audiences", "is_complete": true,
            "freeform_tags": ["Fluff"], "summary": "Tiny.", "word_count": 900,
            "chapters": "1/1", "comments": 1, "kudos": 10
        },
        {
            "title": "Long", "url": "https://archiveofourown.org/works/2",
            "fandoms": ["F"], "rating": "Teen And Up Audiences", "is_complete": false,
            "freeform_tags": ["Angst"], "summary": "Huge.", "word_count": 90000,
            "chapters": "20/?", "comments": 300, "kudos": 4000
        },
        {
            "title": "Medium", "url": "https://archiveofourown.org/works/3",
            "fandoms": ["F"], "freeform_tags": [], "summary": "Mid.", "word_count": 15000,
            "kudos": 200
        }
    ])
}

struct LongerWins;

impl Respond for LongerWins {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let prompt = body["messages"]
            .as_array()
            .and_then(|m| m.last())
            .and_then(|m| m["content"].as_str())
            .unwrap_or("")
            .to_string();
        let counts: Vec<u64> = prompt
            .lines()
            .filter_map(|l| l.strip_prefix("Word Count: "))
            .filter_map(|n| n.trim().parse().ok())
            .collect();
        let content = match counts.as_slice() {
            [a, b] if a > b => "<Fic 1>",
            [_, _] => "<Fic 2>",
            _ => "",
        };
        ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": content },
            "done": true
        }))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn rank_then_report_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/show"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model_info": { "llama.context_length": 8192 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(LongerWins)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let works_path = dir.path().join("works.json");
    let out_path = dir.path().join("ranked.json");
    let report_path = dir.path().join("ranked.md");
    let rerender_path = dir.path().join("again.md");
    std::fs::write(&works_path, records().to_string()).unwrap();

    let base_url = server.uri();
    let (works_arg, out_arg, report_arg) =
        (works_path.clone(), out_path.clone(), report_path.clone());
    let status = tokio::task::spawn_blocking(move || {
        Command::new(env!("CARGO_BIN_EXE_ficrank"))
            .env("OLLAMA_BASE_URL", base_url)
            .args(["rank", "--preference", "long epics", "--seed", "3", "--batch-size", "2"])
            .arg("--works")
            .arg(works_arg)
            .arg("--out")
            .arg(out_arg)
            .arg("--report")
            .arg(report_arg)
            .status()
            .unwrap()
    })
    .await
    .unwrap();
    assert!(status.success());

    let ranked: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(ranked["status"], "completed");
    let titles: Vec<&str> = ranked["works"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Long", "Medium", "Short"]);
    assert_eq!(ranked["works"][0]["rank"], 1);
    assert!(ranked["usage"]["calls"].as_u64().unwrap() >= 2);

    let md = std::fs::read_to_string(&report_path).unwrap();
    assert!(md.contains("## 1. [Long](https://archiveofourown.org/works/2)"));
    assert!(md.contains("**Preference:** long epics"));

    let status = Command::new(env!("CARGO_BIN_EXE_ficrank"))
        .args(["report", "--ranked"])
        .arg(&out_path)
        .arg("--out")
        .arg(&rerender_path)
        .status()
        .unwrap();
    assert!(status.success());
    let again = std::fs::read_to_string(&rerender_path).unwrap();
    assert!(again.contains("## 3. [Short](https://archiveofourown.org/works/1)"));
}

#[test]
fn rank_rejects_incomplete_records_without_contacting_the_server() {
    let dir = tempdir().unwrap();
    let works_path = dir.path().join("works.json");
    let out_path = dir.path().join("ranked.json");
    std::fs::write(
        &works_path,
        json!([{ "title": "No stats", "summary": "s", "freeform_tags": [] }]).to_string(),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_ficrank"))
        .env("OLLAMA_BASE_URL", "http://127.0.0.1:9")
        .args(["rank", "--preference", "anything"])
        .arg("--works")
        .arg(&works_path)
        .arg("--out")
        .arg(&out_path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No stats"), "{stderr}");
    assert!(stderr.contains("word_count"), "{stderr}");
    assert!(!out_path.exists());
}

/// Loads instantly, then never answers a judgement or an unload in time.
#[cfg(unix)]
struct HungServer;

#[cfg(unix)]
impl Respond for HungServer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let is_load = body["messages"].as_array().is_some_and(|m| m.is_empty())
            && body.get("keep_alive").is_none();
        let reply = ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "<Fic 1>" },
            "done": true
        }));
        if is_load {
            reply
        } else {
            reply.set_delay(std::time::Duration::from_secs(60))
        }
    }
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn second_interrupt_exits_while_unload_hangs() {
    use std::io::{BufRead, BufReader};
    use std::process::Stdio;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/show"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(HungServer)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let works_path = dir.path().join("works.json");
    let out_path = dir.path().join("ranked.json");
    std::fs::write(&works_path, records().to_string()).unwrap();
    let base_url = server.uri();

    let (code, wrote_output) = tokio::task::spawn_blocking(move || {
        let mut child = Command::new(env!("CARGO_BIN_EXE_ficrank"))
            .env("OLLAMA_BASE_URL", base_url)
            .args(["rank", "--preference", "anything"])
            .arg("--works")
            .arg(&works_path)
            .arg("--out")
            .arg(&out_path)
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let (tx, rx) = mpsc::channel();
        let stderr = child.stderr.take().unwrap();
        std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        let wait_for = |needle: &str| loop {
            let line = rx.recv_timeout(Duration::from_secs(20)).unwrap();
            if line.contains(needle) {
                break;
            }
        };
        let interrupt = |pid: u32| {
            let status = Command::new("kill")
                .args(["-INT", &pid.to_string()])
                .status()
                .unwrap();
            assert!(status.success());
        };

        wait_for("Press Ctrl+C");
        std::thread::sleep(Duration::from_millis(500));
        interrupt(child.id());
        wait_for("Interrupt received");
        std::thread::sleep(Duration::from_millis(500));
        interrupt(child.id());

        let deadline = Instant::now() + Duration::from_secs(20);
        let status = loop {
            if let Some(status) = child.try_wait().unwrap() {
                break status;
            }
            assert!(Instant::now() < deadline, "ficrank ignored the second interrupt");
            std::thread::sleep(Duration::from_millis(50));
        };
        (status.code(), out_path.exists())
    })
    .await
    .unwrap();

    assert_eq!(code, Some(130));
    assert!(!wrote_output);
}
