use std::fs;
use std::path::{Path, PathBuf};

/// Only these trees may hold or drive an `ExchangeClient` directly
const EXCHANGE_OWNERS: &[&str] = &["src/gateway/", "src/exchange/", "src/adapters/"];

fn collect_rust_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, out);
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

#[test]
fn exchange_clients_are_only_driven_by_the_gateway() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    collect_rust_files(&repo_root.join("src"), &mut files);

    let mut offenders = Vec::new();
    for file in files {
        let rel = file
            .strip_prefix(repo_root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        if EXCHANGE_OWNERS.iter().any(|owner| rel.starts_with(owner)) {
            continue;
        }
        let content = fs::read_to_string(&file).unwrap_or_default();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            let bypasses_gateway = trimmed.contains("dyn ExchangeClient")
                || trimmed.contains(".handshake(")
                || trimmed.contains("client.create_order(");
            if bypasses_gateway {
                offenders.push(format!("{rel}:{}: {}", idx + 1, trimmed));
            }
        }
    }

    assert!(
        offenders.is_empty(),
        "exchange access outside the gateway:\n{}",
        offenders.join("\n")
    );
}
