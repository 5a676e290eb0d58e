//! Operator commands: `corral pending` and `corral approve`.

use corral_enroll::protocol::RequestSummary;

use crate::cli::RemoteArgs;
use crate::client::EnrollClient;

use super::print_json;

pub fn pending(remote: &RemoteArgs, json: bool) -> anyhow::Result<()> {
    let client = EnrollClient::new(&remote.server);
    let requests = client.requests(&remote.token)?;

    if json {
        print_json(&requests);
        return Ok(());
    }
    if requests.is_empty() {
        println!("No signing requests.");
        return Ok(());
    }
    for line in request_lines(&requests) {
        println!("{line}");
    }
    Ok(())
}

pub fn approve(remote: &RemoteArgs, fingerprint: &str, json: bool) -> anyhow::Result<()> {
    let client = EnrollClient::new(&remote.server);
    let approved = client.approve(&remote.token, fingerprint)?;

    if json {
        print_json(&approved);
    } else {
        println!("Approved {}", approved.fingerprint);
    }
    Ok(())
}

/// Format: `FINGERPRINT\tROLE\tSTATE\tSUBMITTED`
fn request_lines(requests: &[RequestSummary]) -> Vec<String> {
    requests
        .iter()
        .map(|r| {
            let state = if r.approved { "approved" } else { "pending" };
            format!(
                "{}\t{}\t{}\t{}",
                r.fingerprint,
                r.role,
                state,
                r.submitted_at.to_rfc3339()
            )
        })
        .collect()
}
