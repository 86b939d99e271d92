//! End-to-end scenarios across registry, shards, billing and credentials.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use scorehall_core::ScoreHallConfig;
use scorehall_core::error::ScoreHallError;
use scorehall_core::types::Role;
use scorehall_platform::billing::{SCORED_PLAYER_YEN, VISITOR_YEN};
use scorehall_platform::shard::NewScore;
use scorehall_platform::{KeyedTenantLock, Platform};
use serde_json::json;
use tempfile::TempDir;

static KEY_PAIR: LazyLock<(String, String)> = LazyLock::new(|| {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let private = key.to_pkcs1_pem(LineEnding::LF).unwrap().to_string();
    let public = key.to_public_key().to_public_key_pem(LineEnding::LF).unwrap();
    (private, public)
});

fn setup() -> (TempDir, Platform) {
    let dir = tempfile::tempdir().unwrap();
    let platform = Platform::open(&config(dir.path())).unwrap();
    (dir, platform)
}

fn config(dir: &Path) -> ScoreHallConfig {
    let key_file = dir.join("public.pem");
    std::fs::write(&key_file, &KEY_PAIR.1).unwrap();

    let mut config = ScoreHallConfig::default();
    config.registry.path = dir.join("registry.db").display().to_string();
    config.tenant.db_dir = dir.join("tenant_db").display().to_string();
    config.auth.jwt_key_file = key_file.display().to_string();
    config
}

fn credential(sub: &str, role: &str, aud: &str) -> String {
    let key = EncodingKey::from_rsa_pem(KEY_PAIR.0.as_bytes()).unwrap();
    let claims = json!({ "sub": sub, "role": role, "aud": [aud] });
    encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap()
}

fn host(tenant: &str) -> String {
    format!("{tenant}.t.isucon.dev")
}

#[test]
fn test_duplicate_tenant_is_conflict_without_second_shard() {
    let (dir, platform) = setup();

    let first = platform.provision_tenant("alpha", "Alpha").unwrap();
    let err = platform.provision_tenant("alpha", "Alpha again").unwrap_err();
    assert!(matches!(err, ScoreHallError::Conflict(_)));
    assert_eq!(err.status_code(), 400);

    let shards: Vec<_> = std::fs::read_dir(dir.path().join("tenant_db"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".db"))
        .collect();
    assert_eq!(shards.len(), 1);
    assert_eq!(platform.registry().list_tenants_desc().unwrap(), vec![first]);
}

#[test]
fn test_concurrent_provisioning_yields_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(
        Platform::with_lock(&config(dir.path()), Arc::new(KeyedTenantLock::new())).unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let p = platform.clone();
            std::thread::spawn(move || p.provision_tenant(&format!("tenant-{i}"), "T").unwrap().id)
        })
        .collect();
    let ids: HashSet<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(ids.len(), 8);
    for id in ids {
        platform.shards().open(id).unwrap();
    }
}

#[test]
fn test_billing_pages_by_cursor() {
    let (_dir, platform) = setup();
    let ids: Vec<i64> = (0..12)
        .map(|i| platform.provision_tenant(&format!("t{i:02}"), "T").unwrap().id)
        .collect();

    let page1 = platform.billing().report(None).unwrap();
    assert_eq!(page1.len(), 10);
    let page1_ids: Vec<i64> = page1.iter().map(|b| b.tenant_id).collect();
    let mut expected: Vec<i64> = ids.iter().rev().take(10).copied().collect();
    assert_eq!(page1_ids, expected);

    let cursor = *page1_ids.last().unwrap();
    let page2 = platform.billing().report(Some(cursor)).unwrap();
    expected = ids.iter().rev().skip(10).copied().collect();
    assert_eq!(page2.iter().map(|b| b.tenant_id).collect::<Vec<_>>(), expected);

    // Cursor at the fifth-newest tenant: everything strictly older, newest first.
    let rank5 = page1_ids[4];
    let below: Vec<i64> = platform
        .billing()
        .report(Some(rank5))
        .unwrap()
        .iter()
        .map(|b| b.tenant_id)
        .collect();
    assert_eq!(&below[..5], &page1_ids[5..10]);
    assert!(below.iter().all(|id| *id < rank5));
    assert!(below.windows(2).all(|w| w[0] > w[1]));

    let lowest = *ids.first().unwrap();
    assert!(platform.billing().report(Some(lowest)).unwrap().is_empty());
}

#[test]
fn test_billing_end_to_end() {
    let (_dir, platform) = setup();
    let tenant = platform.provision_tenant("alpha", "Alpha").unwrap();
    let shard = platform.shards().open(tenant.id).unwrap();
    let seq = platform.sequence();

    let comp = seq.next().unwrap();
    shard.insert_competition(&comp, "Final", 1).unwrap();
    let (scorer, watcher, latecomer) = (seq.next().unwrap(), seq.next().unwrap(), seq.next().unwrap());
    for p in [&scorer, &watcher, &latecomer] {
        shard.insert_player(p, "P", 1).unwrap();
    }
    let score = NewScore {
        id: seq.next().unwrap(),
        player_id: scorer.clone(),
        competition_id: comp.clone(),
        score: 42,
    };
    shard.insert_scores(&[score], 2).unwrap();
    platform.registry().record_visit(&watcher, tenant.id, &comp, 3).unwrap();
    platform.registry().record_visit(&scorer, tenant.id, &comp, 3).unwrap();
    shard.finish_competition(&comp, 5).unwrap();
    platform.registry().record_visit(&latecomer, tenant.id, &comp, 6).unwrap();

    let report = platform.billing().report(None).unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].billing_yen, SCORED_PLAYER_YEN + VISITOR_YEN);
    assert_eq!(report[0].id, tenant.id.to_string());

    let err = shard.finish_competition(&comp, 9).unwrap_err();
    assert!(matches!(err, ScoreHallError::Validation(_)));
}

#[test]
fn test_credentials_resolve_per_tenant() {
    let (_dir, platform) = setup();
    let alpha = platform.provision_tenant("alpha", "Alpha").unwrap();
    platform.provision_tenant("beta", "Beta").unwrap();
    let viewer = platform.viewer();

    let organizer = credential("org-1", "organizer", "alpha");
    let id = viewer.resolve(Some(&organizer), &host("alpha")).unwrap();
    assert_eq!(id.role, Role::Organizer);
    assert_eq!(id.tenant_id, alpha.id);

    let err = viewer.resolve(Some(&organizer), &host("beta")).unwrap_err();
    assert!(matches!(err, ScoreHallError::Authentication(_)));

    let admin = credential("root", "admin", "admin");
    assert_eq!(viewer.resolve(Some(&admin), &host("admin")).unwrap().role, Role::Admin);
    let err = viewer.resolve(Some(&organizer), &host("admin")).unwrap_err();
    assert_eq!(err.status_code(), 401);

    let err = viewer.resolve(Some(&credential("p", "player", "gamma")), &host("gamma")).unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[test]
fn test_disqualified_player_is_forbidden() {
    let (_dir, platform) = setup();
    let tenant = platform.provision_tenant("alpha", "Alpha").unwrap();
    let shard = platform.shards().open(tenant.id).unwrap();

    let player = platform.sequence().next().unwrap();
    shard.insert_player(&player, "Pat", 1).unwrap();
    let token = credential(&player, "player", "alpha");
    let identity = platform.viewer().resolve(Some(&token), &host("alpha")).unwrap();
    identity.require_role(Role::Player).unwrap();
    shard.authorize_player(&identity.subject).unwrap();

    shard.disqualify_player(&player, 2).unwrap();
    let err = shard.authorize_player(&identity.subject).unwrap_err();
    assert!(matches!(err, ScoreHallError::Authorization(_)));
    assert_eq!(err.status_code(), 403);

    let err = shard.authorize_player("ghost").unwrap_err();
    assert_eq!(err.status_code(), 401);
}

#[test]
fn test_reset_drops_tenants_shards_and_caches() {
    let (dir, platform) = setup();
    let tenant = platform.provision_tenant("alpha", "Alpha").unwrap();
    platform.shards().open(tenant.id).unwrap();
    let token = credential("org", "organizer", "alpha");
    platform.viewer().resolve(Some(&token), &host("alpha")).unwrap();
    assert_eq!(platform.credentials().cached_tokens(), 1);

    platform.reset().unwrap();

    assert!(platform.registry().list_tenants_desc().unwrap().is_empty());
    assert_eq!(platform.shards().cached_count(), 0);
    assert_eq!(platform.credentials().cached_tokens(), 0);
    let leftovers = std::fs::read_dir(dir.path().join("tenant_db")).unwrap().count();
    assert_eq!(leftovers, 0);

    // The token still verifies, but its tenant is gone.
    let err = platform.viewer().resolve(Some(&token), &host("alpha")).unwrap_err();
    assert!(matches!(err, ScoreHallError::NotFound(_)));
}
