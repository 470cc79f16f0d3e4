//! Contract tests against a real Chromium binary. Ignored by default because they
//! require Chrome/Chromium on the host machine.

use std::env;

use cdp_adapter::{Cdp, CdpAdapter, CdpConfig};

fn contract_enabled() -> bool {
    env::var("CALLWARDEN_CDP_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set CALLWARDEN_CDP_CONTRACT=1"]
async fn contract_evaluate_and_click() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (CALLWARDEN_CDP_CONTRACT not enabled)");
        return;
    }

    let mut cfg = CdpConfig::default();
    cfg.headless = true;
    let adapter = CdpAdapter::new(cfg);
    adapter.start().await.expect("adapter start");

    let page = adapter
        .create_page("data:text/html,<button id=b onclick=\"this.dataset.hit=1\" style=\"position:absolute;left:0;top:0;width:50px;height:50px\">x</button>")
        .await
        .expect("create page");

    let sum = adapter
        .evaluate_script(&page, "Promise.resolve(20 + 22)")
        .await
        .expect("evaluate");
    assert_eq!(sum, serde_json::json!(42));

    adapter
        .dispatch_click(&page, 25.0, 25.0)
        .await
        .expect("click");
    let hit = adapter
        .evaluate_script(&page, "document.getElementById('b').dataset.hit || null")
        .await
        .expect("read flag");
    assert_eq!(hit, serde_json::json!("1"));

    adapter.close_page(&page).await.expect("close page");
    let gone = adapter
        .evaluate_script(&page, "1")
        .await
        .expect_err("closed page still answers");
    assert!(gone.is_page_gone());
    adapter.shutdown().await;
}
