mod support;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use backend::ranks::{
    update_rank, CommitOutcome, LeaderboardSnapshot, LeaderboardStore, MemoryLeaderboards, Rank,
    RankCommit, RankEngine, RankUpdateError, StoreError,
};
use backend::validation::ProcessedRun;
use backend::xp::{DefaultXpFormula, XpFormula};
use common::bitflags::ActivityType;
use common::{Gamemode, LeaderboardKey, MapId, RunStats, TrackType, UserId};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;
use support::*;

fn run(user_id: UserId, time: f64) -> ProcessedRun {
    ProcessedRun {
        id: uuid::Uuid::from_u128(u128::from(user_id) << 64 | time.to_bits() as u128),
        map_id: MAP_ID,
        user_id,
        steam_id: STEAM_ID + u64::from(user_id),
        gamemode: Gamemode::Surf,
        track_type: TrackType::Main,
        track_num: 1,
        zone_num: 0,
        style: 0,
        ticks: (time / SURF_TICK).round() as u32,
        tick_interval: SURF_TICK,
        time,
        flags: 0,
        stats: RunStats {
            overall: Default::default(),
            zones: vec![],
        },
        submitted_at: now(),
    }
}

fn key() -> LeaderboardKey {
    LeaderboardKey::new(Gamemode::Surf, TrackType::Main, 1, 0)
}

fn engine() -> (Arc<MemoryLeaderboards>, RankEngine) {
    let store = Arc::new(MemoryLeaderboards::new());
    let engine = RankEngine::new(store.clone(), Arc::new(DefaultXpFormula::default()));
    (store, engine)
}

fn times(store: &MemoryLeaderboards) -> Vec<(UserId, u32, f64)> {
    store
        .ranks(MAP_ID, key())
        .into_iter()
        .map(|r| (r.user_id, r.rank, r.time))
        .collect()
}

#[tokio::test]
async fn personal_bests_only_improve() {
    let (store, engine) = engine();
    let map = map();

    let mut pbs = Vec::new();
    let mut stored = Vec::new();
    for time in [10.0, 12.0, 9.0, 9.0, 8.5] {
        let update = engine.submit(&run(1, time), &map).await.unwrap();
        pbs.push(update.is_personal_best);
        stored.push(store.ranks(MAP_ID, key())[0].time);
    }

    assert_eq!(pbs, vec![true, false, true, false, true]);
    assert_eq!(stored, vec![10.0, 10.0, 9.0, 9.0, 8.5]);
}

#[tokio::test]
async fn world_record_in_either_order() {
    for (first, second, wr_flags) in [
        ((1, 5.0), (2, 4.5), vec![true, true]),
        ((2, 4.5), (1, 5.0), vec![true, false]),
    ] {
        let (store, engine) = engine();
        let map = map();

        let mut flags = Vec::new();
        for (user, time) in [first, second] {
            let update = engine.submit(&run(user, time), &map).await.unwrap();
            flags.push(update.is_world_record);
        }

        assert_eq!(flags, wr_flags);
        assert_eq!(times(&store), vec![(2, 1, 4.5), (1, 2, 5.0)]);
    }
}

#[tokio::test]
async fn ranks_shift_down() {
    let (store, engine) = engine();
    let map = map();
    let xp = DefaultXpFormula::default();

    engine.submit(&run(1, 10.0), &map).await.unwrap();
    engine.submit(&run(2, 20.0), &map).await.unwrap();
    let update = engine.submit(&run(3, 15.0), &map).await.unwrap();

    assert!(update.is_personal_best);
    assert!(!update.is_world_record);
    assert_eq!(update.activity, Some(ActivityType::PbAchieved));
    assert_eq!(update.rank_create.as_ref().map(|r| r.rank), Some(2));
    assert_eq!(update.xp.rank_xp, xp.rank_xp(2, 3));

    assert_eq!(times(&store), vec![(1, 1, 10.0), (3, 2, 15.0), (2, 3, 20.0)]);
    let pushed = &store.ranks(MAP_ID, key())[2];
    assert_eq!(pushed.rank_xp, xp.rank_xp(3, 3));

    // Tying the record does not take it.
    let update = engine.submit(&run(4, 10.0), &map).await.unwrap();
    assert!(!update.is_world_record);
    assert_eq!(update.rank_create.map(|r| r.rank), Some(2));
}

#[tokio::test]
async fn slower_runs_still_earn_cosmetic_xp() {
    let (store, engine) = engine();
    let map = map();

    let first = engine.submit(&run(1, 10.0), &map).await.unwrap();
    assert_eq!(first.activity, Some(ActivityType::WrAchieved));
    assert_eq!(first.xp.cos_xp.gain_xp, 40000);

    let slower = engine.submit(&run(1, 11.0), &map).await.unwrap();
    assert!(!slower.is_personal_best);
    assert!(slower.rank_create.is_none());
    assert_eq!(slower.activity, None);
    assert_eq!(slower.xp.rank_xp, 0);
    assert_eq!(slower.xp.cos_xp.old_xp, 40000);
    assert_eq!(slower.xp.cos_xp.gain_xp, 1000);
    assert_eq!(slower.existing_rank.map(|r| r.time), Some(10.0));

    assert_eq!(store.cos_xp(1), 41000);
}

#[test]
fn improving_on_own_record() {
    let existing = Rank {
        user_id: 1,
        run_id: uuid::Uuid::nil(),
        rank: 1,
        rank_xp: 520,
        time: 10.0,
        stats: RunStats {
            overall: Default::default(),
            zones: vec![],
        },
        created_at: now(),
    };
    let snapshot = LeaderboardSnapshot {
        version: 3,
        existing_rank: Some(existing),
        world_record: Some(12.0),
        completions: 2,
        position: 1,
        user_cos_xp: 0,
    };

    let update = update_rank(&snapshot, &run(1, 9.0), &map(), &DefaultXpFormula::default());
    assert!(update.is_personal_best);
    assert!(update.is_world_record);
    assert_eq!(update.activity, Some(ActivityType::WrAchieved));
    assert_eq!(update.rank_create.map(|r| (r.rank, r.time)), Some((1, 9.0)));
}

/// Reports a conflict for the first few commits.
struct FlakyStore {
    inner: MemoryLeaderboards,
    conflicts: AtomicU32,
    commits: AtomicU32,
}

impl FlakyStore {
    fn new(conflicts: u32) -> Self {
        Self {
            inner: MemoryLeaderboards::new(),
            conflicts: AtomicU32::new(conflicts),
            commits: AtomicU32::new(0),
        }
    }
}

#[async_trait::async_trait]
impl LeaderboardStore for FlakyStore {
    async fn snapshot(
        &self,
        map_id: MapId,
        key: LeaderboardKey,
        user_id: UserId,
        candidate_time: f64,
    ) -> Result<LeaderboardSnapshot, StoreError> {
        self.inner.snapshot(map_id, key, user_id, candidate_time).await
    }

    async fn commit(
        &self,
        commit: RankCommit,
        xp: &dyn XpFormula,
    ) -> Result<CommitOutcome, StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Ok(CommitOutcome::Conflict);
        }
        self.inner.commit(commit, xp).await
    }
}

#[tokio::test]
#[traced_test]
async fn retries_on_conflict() {
    let store = Arc::new(FlakyStore::new(2));
    let engine = RankEngine::new(store.clone(), Arc::new(DefaultXpFormula::default()));

    let update = engine.submit(&run(1, 10.0), &map()).await.unwrap();
    assert!(update.is_personal_best);
    assert_eq!(store.commits.load(Ordering::SeqCst), 3);
    assert_eq!(store.inner.ranks(MAP_ID, key()).len(), 1);
    assert!(logs_contain("retrying"));
}

#[tokio::test]
async fn gives_up_eventually() {
    let store = Arc::new(FlakyStore::new(u32::MAX));
    let engine = RankEngine::new(store.clone(), Arc::new(DefaultXpFormula::default()))
        .with_max_attempts(3);

    let err = engine.submit(&run(1, 10.0), &map()).await.unwrap_err();
    assert!(matches!(
        err,
        RankUpdateError::ConcurrentUpdateExhausted { attempts: 3 }
    ));
    assert_eq!(store.commits.load(Ordering::SeqCst), 3);
    assert!(store.inner.ranks(MAP_ID, key()).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions() {
    let store = Arc::new(MemoryLeaderboards::new());
    let engine = RankEngine::new(store.clone(), Arc::new(DefaultXpFormula::default()))
        .with_max_attempts(1000);
    let map = Arc::new(map());

    let mut handles = Vec::new();
    for user in 1..=20_u32 {
        for attempt in 0..3 {
            let engine = engine.clone();
            let map = map.clone();
            let time = 100.0 - f64::from(user) - f64::from(attempt) * 0.25;
            handles.push(tokio::spawn(async move {
                engine.submit(&run(user, time), &map).await
            }));
        }
    }

    let mut world_records = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_world_record {
            world_records += 1;
        }
    }
    assert!(world_records >= 1);

    let ranks = times(&store);
    assert_eq!(ranks.len(), 20);
    for (i, (user, rank, time)) in ranks.into_iter().enumerate() {
        assert_eq!(rank, i as u32 + 1);
        assert_eq!(user, 20 - i as u32);
        assert_eq!(time, 100.0 - f64::from(user) - 0.5);
    }
}
