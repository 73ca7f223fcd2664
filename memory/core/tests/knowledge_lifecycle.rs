// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Knowledge versioning and archive lifecycle against every backend.

mod common;

use aegis_memory_core::application::MemoryStore;
use aegis_memory_core::domain::knowledge::{
    generate_commit_id, CommitId, Knowledge, KnowledgeState, Slug, SlugSummary, Topic, TopicSummary,
};
use chrono::{DateTime, Duration};

async fn latest_commit_is_current(store: &MemoryStore) {
    let repo = store.knowledge();
    let clock = common::clock();
    let topic = Topic::new(common::unique("runbooks"));
    let slug = Slug::new("restart-service");

    let v1 = Knowledge::new(topic.clone(), slug.clone(), "Restart", "systemctl restart", "alice", &clock);
    let c1 = repo.put(&v1).await.unwrap();
    assert_eq!(c1, v1.commit_id);

    clock.advance(Duration::minutes(10));
    let v2 = v1.revise("Restart a service", "systemctl restart --no-block", "bob", &clock);
    let c2 = repo.put(&v2).await.unwrap();
    assert_ne!(c1, c2);

    let current = repo.get(&topic, &slug).await.unwrap().unwrap();
    assert_eq!(current.commit_id, c2);
    assert_eq!(current.author, "bob");
    assert_eq!(current.created_at, v1.created_at);

    // Old commits stay addressable
    let old = repo.get_by_commit(&topic, &slug, &c1).await.unwrap().unwrap();
    assert_eq!(old.content, "systemctl restart");
    assert!(repo
        .get_by_commit(&topic, &slug, &CommitId("feedface".into()))
        .await
        .unwrap()
        .is_none());

    // Re-putting an existing commit changes nothing
    assert_eq!(repo.put(&v1).await.unwrap(), c1);
    assert_eq!(repo.get(&topic, &slug).await.unwrap().unwrap().commit_id, c2);
}

async fn archive_and_reactivate(store: &MemoryStore) {
    let repo = store.knowledge();
    let clock = common::clock();
    let topic = Topic::new(common::unique("playbooks"));

    let alpha = Knowledge::new(topic.clone(), Slug::new("alpha"), "Alpha", "aaaa", "alice", &clock);
    let beta = Knowledge::new(topic.clone(), Slug::new("beta"), "Beta", "bb", "alice", &clock);
    repo.put(&alpha).await.unwrap();
    repo.put(&beta).await.unwrap();

    let slugs = repo.list_slugs(&topic).await.unwrap();
    assert_eq!(
        slugs,
        vec![
            SlugSummary { slug: alpha.slug.clone(), name: "Alpha".into() },
            SlugSummary { slug: beta.slug.clone(), name: "Beta".into() },
        ]
    );
    assert_eq!(repo.size(&topic).await.unwrap(), 6);

    repo.archive(&topic, &alpha.slug).await.unwrap();
    assert!(repo.get(&topic, &alpha.slug).await.unwrap().is_none());
    let archived = repo.get_by_commit(&topic, &alpha.slug, &alpha.commit_id).await.unwrap().unwrap();
    assert_eq!(archived.state, KnowledgeState::Archived);
    assert_eq!(repo.list(&topic).await.unwrap().len(), 1);
    assert_eq!(repo.size(&topic).await.unwrap(), 2);

    let topics = repo.list_topics().await.unwrap();
    assert!(topics.contains(&TopicSummary { topic: topic.clone(), active_slugs: 1 }));

    // Archiving something unknown is a no-op
    repo.archive(&topic, &Slug::new("ghost")).await.unwrap();
    repo.archive(&Topic::new(common::unique("nowhere")), &alpha.slug).await.unwrap();

    // A new commit brings the slug back
    clock.advance(Duration::seconds(5));
    let revived = alpha.revise("Alpha", "aaaa v2", "carol", &clock);
    repo.put(&revived).await.unwrap();
    let current = repo.get(&topic, &alpha.slug).await.unwrap().unwrap();
    assert_eq!(current.commit_id, revived.commit_id);
    assert_eq!(current.state, KnowledgeState::Active);

    repo.archive(&topic, &alpha.slug).await.unwrap();
    repo.archive(&topic, &beta.slug).await.unwrap();
    let topics = repo.list_topics().await.unwrap();
    assert!(!topics.iter().any(|t| t.topic == topic));
}

async fn invalid_knowledge_is_rejected(store: &MemoryStore) {
    let repo = store.knowledge();
    let clock = common::clock();
    let topic = Topic::new(common::unique("rejects"));

    let mut tampered = Knowledge::new(topic.clone(), Slug::new("s"), "Name", "content", "alice", &clock);
    tampered.content = "edited after hashing".into();
    assert!(repo.put(&tampered).await.unwrap_err().is_validation());

    let long_name = Knowledge::new(topic.clone(), Slug::new("s"), "n".repeat(101), "content", "alice", &clock);
    assert!(repo.put(&long_name).await.unwrap_err().is_validation());

    let bad_slug = Knowledge::new(topic.clone(), Slug::new("../etc"), "Name", "content", "alice", &clock);
    assert!(repo.put(&bad_slug).await.unwrap_err().is_validation());

    assert!(repo.list(&topic).await.unwrap().is_empty());
}

async fn caller_addressed_commits_keep_their_id(store: &MemoryStore) {
    let repo = store.knowledge();
    let topic = Topic::new(common::unique("imports"));
    let at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();

    let imported = Knowledge {
        topic: topic.clone(),
        slug: Slug::new("legacy"),
        commit_id: generate_commit_id(at, "alice", "body"),
        name: "Legacy".into(),
        content: "body".into(),
        author: "alice".into(),
        created_at: at,
        updated_at: at,
        state: KnowledgeState::Active,
    };
    assert!(imported.validate().is_ok());

    let stored = repo.put(&imported).await.unwrap();
    assert_eq!(stored, imported.commit_id);

    let current = repo.get(&topic, &imported.slug).await.unwrap().unwrap();
    assert_eq!(current, imported);

    // An empty id is derived from the full-precision update time
    let later = at + Duration::nanoseconds(1);
    let unaddressed = Knowledge {
        commit_id: CommitId::default(),
        content: "body v2".into(),
        updated_at: later,
        ..imported.clone()
    };
    let derived = repo.put(&unaddressed).await.unwrap();
    assert_eq!(derived, generate_commit_id(later, "alice", "body v2"));
    assert_eq!(repo.get(&topic, &imported.slug).await.unwrap().unwrap().commit_id, derived);
}

async fn run_all(store: &MemoryStore) {
    latest_commit_is_current(store).await;
    caller_addressed_commits_keep_their_id(store).await;
    archive_and_reactivate(store).await;
    invalid_knowledge_is_rejected(store).await;
}

#[tokio::test]
async fn test_in_memory_backend() {
    run_all(&MemoryStore::in_memory()).await;
}

#[tokio::test]
#[ignore]
async fn test_postgres_backend() {
    let Some(store) = common::postgres_store().await else {
        eprintln!("AEGIS_MEMORY_TEST_DATABASE_URL not set, skipping");
        return;
    };
    run_all(&store).await;
}
