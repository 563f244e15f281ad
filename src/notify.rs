use log::warn;

/// Fire a desktop notification for a phase boundary. Best-effort: denied
/// permission or a missing notification daemon only logs. The show() call
/// can block on the session bus, so it runs on the blocking pool.
pub fn phase_complete(title: &str, body: &str) {
    let title = title.to_string();
    let body = body.to_string();
    tokio::task::spawn_blocking(move || {
        if let Err(err) = notify_rust::Notification::new()
            .summary(&title)
            .body(&body)
            .appname("studysentry")
            .show()
        {
            warn!("Failed to send notification: {err}");
        }
    });
}
