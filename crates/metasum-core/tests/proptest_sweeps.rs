use metasum_core::db::{open_in_memory, query};
use metasum_core::{NewLogEntry, SummarizerConfig, Summarizer, Sweep, WorkflowSummaryReducer};
use proptest::prelude::*;
use rusqlite::Connection;

use generators::*;

const MAX_ROUNDS: usize = 10_000;

fn journal_db(entries: &[NewLogEntry]) -> Connection {
    let mut conn = open_in_memory().expect("open db");
    query::append_entries(&mut conn, entries).expect("append journal");
    conn
}

fn catch_up(conn: &mut Connection, sweep: &Sweep, limit: usize) {
    let config = SummarizerConfig::default();
    Summarizer::from_config(&config)
        .expect("default config")
        .run_until_caught_up(conn, sweep, limit, &WorkflowSummaryReducer, MAX_ROUNDS)
        .expect("sweep to completion");
}

fn increasing() -> Sweep {
    Sweep::increasing(&SummarizerConfig::default().sweeps)
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    #[test]
    fn increasing_result_is_independent_of_batch_size(
        journal in arb_journal(60),
        limit in 1usize..8,
    ) {
        let mut small = journal_db(&journal);
        let mut whole = journal_db(&journal);
        catch_up(&mut small, &increasing(), limit);
        catch_up(&mut whole, &increasing(), 1000);

        prop_assert_eq!(
            query::list_summaries(&small).expect("summaries"),
            query::list_summaries(&whole).expect("summaries")
        );
        prop_assert_eq!(
            query::list_labels(&small).expect("labels"),
            query::list_labels(&whole).expect("labels")
        );
    }

    #[test]
    fn flagged_sweep_matches_increasing_sweep(
        journal in arb_journal(60),
        limit in 1usize..8,
    ) {
        let mut flagged = journal_db(&journal);
        let mut forward = journal_db(&journal);
        catch_up(&mut flagged, &Sweep::Flagged, limit);
        catch_up(&mut forward, &increasing(), limit);

        prop_assert_eq!(query::count_flagged(&flagged).expect("count"), 0);
        prop_assert_eq!(
            query::list_summaries(&flagged).expect("summaries"),
            query::list_summaries(&forward).expect("summaries")
        );
        prop_assert_eq!(
            query::list_labels(&flagged).expect("labels"),
            query::list_labels(&forward).expect("labels")
        );
    }

    #[test]
    fn backward_sweep_reaches_every_summary(
        journal in arb_journal(60),
        limit in 1usize..8,
    ) {
        let names = SummarizerConfig::default().sweeps;
        let mut backward = journal_db(&journal);
        let mut forward = journal_db(&journal);
        // Pretend the forward sweep started after the last existing entry.
        let max_id: Option<i64> = backward
            .query_row("SELECT MAX(entry_id) FROM metadata_entry", [], |row| row.get(0))
            .expect("max id");
        if let Some(max_id) = max_id {
            backward
                .execute(
                    "INSERT INTO summary_status (sweep_name, position, updated_at_us) VALUES (?1, ?2, 0)",
                    rusqlite::params![names.increasing, max_id],
                )
                .expect("seed increasing watermark");
        }

        catch_up(&mut backward, &Sweep::decreasing(&names), limit);
        catch_up(&mut forward, &increasing(), 1000);

        prop_assert_eq!(
            query::list_summaries(&backward).expect("summaries"),
            query::list_summaries(&forward).expect("summaries")
        );
    }

    #[test]
    fn caught_up_sweep_is_idempotent(
        journal in arb_journal(40),
        limit in 1usize..8,
    ) {
        let mut conn = journal_db(&journal);
        catch_up(&mut conn, &increasing(), limit);
        let summaries = query::list_summaries(&conn).expect("summaries");
        let labels = query::list_labels(&conn).expect("labels");

        let name = SummarizerConfig::default().sweeps.increasing;
        let again = Summarizer::from_config(&SummarizerConfig::default())
            .expect("default config")
            .run_increasing_sweep(&mut conn, &name, limit, &WorkflowSummaryReducer)
            .expect("repeat sweep");

        prop_assert_eq!(again.processed, 0);
        prop_assert_eq!(again.backlog, 0);
        prop_assert_eq!(query::list_summaries(&conn).expect("summaries"), summaries);
        prop_assert_eq!(query::list_labels(&conn).expect("labels"), labels);
    }
}
