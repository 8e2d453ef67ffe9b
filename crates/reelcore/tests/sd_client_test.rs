//! SD WebUI client against wiremock
//!
//! Run with: cargo test -p reelcore --test sd_client_test

mod common;

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::png;
use pretty_assertions::assert_eq;
use reelcore::diffusion::{Img2ImgParams, RefreshTarget, SdApiClient, SdApiError, Txt2ImgParams};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> SdApiClient {
    SdApiClient::with_http_client(reqwest::Client::new(), format!("{}/", server.uri()))
}

#[tokio::test]
async fn test_txt2img_decodes_images() {
    let server = MockServer::start().await;
    let image = png(1);
    Mock::given(method("POST"))
        .and(path("/sdapi/v1/txt2img"))
        .and(body_partial_json(serde_json::json!({"prompt": "неоновый кот", "steps": 25})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "images": [BASE64.encode(&image)],
            "parameters": {},
            "info": "{}"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let images = client(&server)
        .txt2img(&Txt2ImgParams::with_prompt("неоновый кот"))
        .await
        .unwrap();

    assert_eq!(images, vec![image]);
}

#[tokio::test]
async fn test_img2img_sends_init_images() {
    let server = MockServer::start().await;
    let init = png(2);
    let out = png(3);
    Mock::given(method("POST"))
        .and(path("/sdapi/v1/img2img"))
        .and(body_partial_json(serde_json::json!({
            "init_images": [BASE64.encode(&init)],
            "prompt": "кот"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "images": [format!("data:image/png;base64,{}", BASE64.encode(&out))]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params = Img2ImgParams::for_chain("кот", 0.9);
    let images = client(&server).img2img(&params, &[init]).await.unwrap();

    assert_eq!(images, vec![out]);
}

#[tokio::test]
async fn test_img2img_without_init_image_is_rejected_locally() {
    let server = MockServer::start().await;

    let err = client(&server)
        .img2img(&Img2ImgParams::for_chain("кот", 0.4), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, SdApiError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_prompt_is_rejected_locally() {
    let server = MockServer::start().await;

    let err = client(&server).txt2img(&Txt2ImgParams::with_prompt("  ")).await.unwrap_err();

    assert!(matches!(err, SdApiError::Validation(_)));
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sdapi/v1/samplers"))
        .respond_with(ResponseTemplate::new(500).set_body_string("CUDA out of memory"))
        .mount(&server)
        .await;

    let err = client(&server).samplers().await.unwrap_err();

    match err {
        SdApiError::Status { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "CUDA out of memory");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_progress_returns_none_on_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sdapi/v1/progress"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(client(&server).progress(false).await.is_none());
}

#[tokio::test]
async fn test_progress_returns_none_on_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sdapi/v1/progress"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"progress": 0.5}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = client(&server).progress_timeout(Duration::from_millis(50));

    assert!(client.progress(false).await.is_none());
}

#[tokio::test]
async fn test_progress_parses_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sdapi/v1/progress"))
        .and(query_param("skip_current_image", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "progress": 0.25,
            "eta_relative": 12.5,
            "textinfo": null
        })))
        .mount(&server)
        .await;

    let progress = client(&server).progress(true).await.unwrap();

    assert_eq!(progress.progress, 0.25);
    assert_eq!(progress.eta_relative, 12.5);
}

#[tokio::test]
async fn test_memory_stats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sdapi/v1/memory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ram": {"free": 1024.0, "used": 2048.0, "total": 3072.0},
            "cuda": {"system": {"free": 0}}
        })))
        .mount(&server)
        .await;

    let stats = client(&server).memory().await.unwrap();

    assert_eq!(stats.ram.total, 3072.0);
    assert_eq!(stats.cuda.allocated.current, 0.0);
}

#[tokio::test]
async fn test_refresh_checkpoints() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sdapi/v1/refresh-checkpoints"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .expect(1)
        .mount(&server)
        .await;

    let text = client(&server).refresh(RefreshTarget::Checkpoints).await.unwrap();

    assert_eq!(text, "null");
}

#[tokio::test]
async fn test_extra_single_image_upscales() {
    let server = MockServer::start().await;
    let source = png(3);
    let upscaled = png(4);
    Mock::given(method("POST"))
        .and(path("/sdapi/v1/extra-single-image"))
        .and(body_partial_json(serde_json::json!({
            "image": BASE64.encode(&source),
            "upscaler_1": "R-ESRGAN 4x+",
            "resize_mode": 0,
            "upscaling_resize": 2.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "html_info": "",
            "image": format!("data:image/png;base64,{}", BASE64.encode(&upscaled))
        })))
        .expect(1)
        .mount(&server)
        .await;

    let image = client(&server)
        .extra_single_image(&source, "R-ESRGAN 4x+", 2.0)
        .await
        .unwrap();

    assert_eq!(image, upscaled);
}

#[tokio::test]
async fn test_extra_single_image_without_result_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sdapi/v1/extra-single-image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"images": null})))
        .mount(&server)
        .await;

    let err = client(&server)
        .extra_single_image(&png(1), "Lanczos", 2.0)
        .await
        .unwrap_err();

    assert!(matches!(err, SdApiError::InvalidResponse(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_interrupt_and_skip_post_to_control_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sdapi/v1/interrupt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}\n"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sdapi/v1/skip"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);

    assert_eq!(client.interrupt().await.unwrap(), "{}");
    assert_eq!(client.skip().await.unwrap(), "{}");
}

#[tokio::test]
async fn test_interrupt_reports_backend_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sdapi/v1/interrupt"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let err = client(&server).interrupt().await.unwrap_err();

    assert!(matches!(err, SdApiError::Status { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_upscalers_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sdapi/v1/upscalers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "None", "model_name": null, "scale": 4},
            {"name": "R-ESRGAN 4x+", "model_name": "R-ESRGAN 4x+", "scale": 4.0}
        ])))
        .mount(&server)
        .await;

    let upscalers = client(&server).upscalers().await.unwrap();

    let names: Vec<&str> = upscalers.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["None", "R-ESRGAN 4x+"]);
    assert_eq!(upscalers[1].scale, Some(4.0));
}

#[tokio::test]
async fn test_png_info_sends_encoded_image() {
    let server = MockServer::start().await;
    let image = png(7);
    Mock::given(method("POST"))
        .and(path("/sdapi/v1/png-info"))
        .and(body_partial_json(serde_json::json!({"image": BASE64.encode(&image)})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "info": "a fox\nSteps: 25, Sampler: Euler a",
            "items": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let info = client(&server).png_info(&image).await.unwrap();

    assert_eq!(info["info"], "a fox\nSteps: 25, Sampler: Euler a");
}
