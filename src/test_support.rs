//! Test fixtures: a throwaway HTTP origin that serves audio downloads and accepts result
//! uploads, plus pipeline builders pointed at a scratch directory.

use crate::config::AppConfig;
use crate::jobs::{Job, JobId, JobRegistry};
use crate::pipeline::Pipeline;
use crate::transcription::testing::ScriptedTranscriber;
use actix_web::{dev::ServerHandle, web, App, HttpRequest, HttpResponse, HttpServer};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Defaults with scratch files in `dir` and short network timeouts.
pub fn config_in(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.temp_dir = Some(dir.to_string_lossy().into_owned());
    config.network.download_timeout_seconds = 5;
    config.network.upload_timeout_seconds = 5;
    config
}

pub fn pipeline_in(dir: &Path, transcriber: Arc<ScriptedTranscriber>) -> Pipeline {
    Pipeline::new(transcriber, reqwest::Client::new(), &config_in(dir))
}

/// Poll the registry until the job reaches `completed` or `failed`.
pub async fn wait_for_terminal(registry: &JobRegistry, id: JobId) -> Job {
    for _ in 0..200 {
        let job = registry.get(id).expect("job exists");
        if job.status.is_terminal() {
            return job;
        }
        actix_web::rt::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} did not finish", id);
}

pub fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).map(|mut entries| entries.next().is_none()).unwrap_or(true)
}

/// A PUT received by the origin.
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub path: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

type Uploads = Arc<Mutex<Vec<ReceivedUpload>>>;

pub struct Origin {
    pub base: String,
    uploads: Uploads,
    handle: ServerHandle,
}

impl Origin {
    pub fn audio_bytes(&self) -> Vec<u8> {
        audio_payload()
    }

    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Drop for Origin {
    fn drop(&mut self) {
        let handle = self.handle.clone();
        actix_web::rt::spawn(async move { handle.stop(false).await });
    }
}

fn audio_payload() -> Vec<u8> {
    b"RIFF....WAVEfmt fake audio payload ".repeat(2048)
}

async fn serve_audio() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("audio/mpeg")
        .body(audio_payload())
}

async fn forbidden() -> HttpResponse {
    HttpResponse::Forbidden().body("AccessDenied")
}

async fn slow() -> HttpResponse {
    actix_web::rt::time::sleep(Duration::from_secs(2)).await;
    HttpResponse::Ok().body(audio_payload())
}

async fn accept_upload(req: HttpRequest, body: web::Bytes, uploads: web::Data<Uploads>) -> HttpResponse {
    uploads.lock().unwrap().push(ReceivedUpload {
        path: req.path().to_string(),
        content_type: req
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
    });
    HttpResponse::Ok().finish()
}

async fn reject_upload() -> HttpResponse {
    HttpResponse::Forbidden().body("SignatureDoesNotMatch")
}

/// Start an origin on an ephemeral port. Must run inside an actix system.
pub async fn start_origin() -> Origin {
    let uploads: Uploads = Arc::new(Mutex::new(Vec::new()));
    let data = web::Data::new(uploads.clone());

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .app_data(web::PayloadConfig::new(64 * 1024 * 1024))
            .route("/audio/{name}", web::get().to(serve_audio))
            .route("/forbidden.mp3", web::get().to(forbidden))
            .route("/slow.wav", web::get().to(slow))
            .route("/upload/{name}", web::put().to(accept_upload))
            .route("/reject/{name}", web::put().to(reject_upload))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .expect("bind test origin");

    let addr = server.addrs()[0];
    let server = server.run();
    let handle = server.handle();
    actix_web::rt::spawn(server);

    Origin {
        base: format!("http://{}", addr),
        uploads,
        handle,
    }
}
