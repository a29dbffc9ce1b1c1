use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{Connection, params_from_iter};
use logbook_core::error::{LogbookError, Result};
use logbook_core::filter::{FilterSpec, LogPredicate, LogQuery, WindowDefaults};
use logbook_core::model::{LogEntry, SeverityCounts};
use logbook_core::query::{
    LogPage, OldestRequest, SYSTEM_NAMES_CAP, StatsPlan, StatsRequest, StatsResponse,
    SystemSummary, SystemsRequest,
};

use crate::Store;
use crate::sql::{ENTRY_COLUMNS, WhereClause, entry_from_row, naive_to_utc};

impl Store {
    /// Normalizes `filter` against the current time and returns one page.
    pub fn query(&self, filter: &FilterSpec, defaults: WindowDefaults) -> Result<LogPage> {
        self.fetch_page(&filter.normalize(defaults, Utc::now()))
    }

    /// Count and page are read under the same lock so `total` agrees with
    /// the rows returned.
    pub fn fetch_page(&self, query: &LogQuery) -> Result<LogPage> {
        let conn = self.conn()?;
        let clause = WhereClause::from_predicate(&query.predicate);
        let where_sql = clause.sql();

        let total = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM logs {where_sql}"),
                params_from_iter(clause.args.iter()),
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| LogbookError::Store(format!("count logs failed: {e}")))?;

        let dir = query.sort.direction_sql();
        let sql = format!(
            "SELECT {ENTRY_COLUMNS}
             FROM logs
             {where_sql}
             ORDER BY {col} {dir}, id {dir}
             LIMIT {limit} OFFSET {offset}",
            col = query.sort.key.column(),
            limit = query.page_size,
            offset = query.offset(),
        );
        let items = collect_entries(&conn, &sql, &clause.args, "page")?;

        Ok(LogPage {
            items,
            total: total.max(0) as u64,
            page: query.page,
            page_size: query.page_size,
            window: query.predicate.window,
        })
    }

    pub fn get_log(&self, id: i64) -> Result<LogEntry> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM logs WHERE id = ?");
        let mut found = collect_entries(&conn, &sql, &[duckdb::types::Value::BigInt(id)], "get")?;
        found
            .pop()
            .ok_or_else(|| LogbookError::NotFound(format!("log entry {id} not found")))
    }

    /// One row per non-blank system, most recently active first.
    pub fn distinct_systems(&self, req: &SystemsRequest) -> Result<Vec<SystemSummary>> {
        let conn = self.conn()?;
        let mut clause = WhereClause::from_predicate(&req.predicate());
        clause.push("system_details IS NOT NULL AND trim(system_details) <> ''", []);

        let sql = format!(
            "SELECT system_details, COUNT(*) AS n, MAX(created_at) AS last_log_at
             FROM logs
             {}
             GROUP BY system_details
             ORDER BY last_log_at DESC, system_details ASC",
            clause.sql()
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LogbookError::Store(format!("prepare systems failed: {e}")))?;
        let rows = stmt
            .query_map(params_from_iter(clause.args.iter()), |row| {
                Ok(SystemSummary {
                    system_details: row.get::<_, String>(0)?,
                    count: row.get::<_, i64>(1)?.max(0) as u64,
                    last_log_at: naive_to_utc(row.get::<_, NaiveDateTime>(2)?),
                })
            })
            .map_err(|e| LogbookError::Store(format!("query systems failed: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| LogbookError::Store(format!("map systems row failed: {e}")))?);
        }
        Ok(out)
    }

    /// Distinct non-blank system names, ascending, capped for pickers.
    pub fn system_names(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT DISTINCT system_details
             FROM logs
             WHERE system_details IS NOT NULL AND trim(system_details) <> ''
             ORDER BY system_details ASC
             LIMIT {SYSTEM_NAMES_CAP}"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LogbookError::Store(format!("prepare system names failed: {e}")))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| LogbookError::Store(format!("query system names failed: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(
                row.map_err(|e| LogbookError::Store(format!("map system name failed: {e}")))?,
            );
        }
        Ok(out)
    }

    pub fn severity_counts(&self, predicate: &LogPredicate) -> Result<SeverityCounts> {
        let conn = self.conn()?;
        count_by_level(&conn, predicate)
    }

    pub fn stats(&self, req: &StatsRequest) -> Result<StatsResponse> {
        self.stats_at(req, Utc::now())
    }

    pub fn stats_at(&self, req: &StatsRequest, now: DateTime<Utc>) -> Result<StatsResponse> {
        let conn = self.conn()?;
        match req.plan(now) {
            StatsPlan::Rolling {
                last_day,
                last_week,
                last_month,
            } => Ok(StatsResponse::Rolling {
                last_day: count_by_level(&conn, &LogPredicate::within(last_day))?,
                last_week: count_by_level(&conn, &LogPredicate::within(last_week))?,
                last_month: count_by_level(&conn, &LogPredicate::within(last_month))?,
            }),
            StatsPlan::Period(window) => Ok(StatsResponse::Period {
                period: count_by_level(&conn, &LogPredicate::within(window))?,
            }),
        }
    }

    /// The earliest entries by creation time, oldest first.
    pub fn oldest(&self, req: &OldestRequest) -> Result<Vec<LogEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {ENTRY_COLUMNS}
             FROM logs
             ORDER BY created_at ASC, id ASC
             LIMIT {}",
            req.limit()
        );
        collect_entries(&conn, &sql, &[], "oldest")
    }
}

fn count_by_level(conn: &Connection, predicate: &LogPredicate) -> Result<SeverityCounts> {
    let clause = WhereClause::from_predicate(predicate);
    let sql = format!(
        "SELECT level, COUNT(*) FROM logs {} GROUP BY level",
        clause.sql()
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| LogbookError::Store(format!("prepare level counts failed: {e}")))?;
    let rows = stmt
        .query_map(params_from_iter(clause.args.iter()), |row| {
            Ok((row.get::<_, i32>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
        })
        .map_err(|e| LogbookError::Store(format!("query level counts failed: {e}")))?;

    let mut groups = Vec::new();
    for row in rows {
        groups.push(row.map_err(|e| LogbookError::Store(format!("map level count failed: {e}")))?);
    }
    Ok(SeverityCounts::from_groups(groups))
}

fn collect_entries(
    conn: &Connection,
    sql: &str,
    args: &[duckdb::types::Value],
    what: &str,
) -> Result<Vec<LogEntry>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| LogbookError::Store(format!("prepare {what} failed: {e}")))?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), entry_from_row)
        .map_err(|e| LogbookError::Store(format!("query {what} failed: {e}")))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| LogbookError::Store(format!("map {what} row failed: {e}")))?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use logbook_core::filter::{SortKey, SortSpec, TimeWindow};
    use logbook_core::model::Severity;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 16, 17, 0, 0).unwrap()
    }

    fn seeded(store: &Store) -> Vec<LogEntry> {
        store.insert_logs(&testkit::mixed_batch(now())).unwrap()
    }

    #[test]
    fn third_page_of_250_holds_the_remainder() {
        let store = Store::open_in_memory().unwrap();
        let batch: Vec<_> = (0..250)
            .map(|i| testkit::entry_at(&format!("entry {i}"), 2, now() - Duration::seconds(i)))
            .collect();
        store.insert_logs(&batch).unwrap();

        let page = store
            .fetch_page(
                &FilterSpec {
                    page: Some(3),
                    page_size: Some(100),
                    ..FilterSpec::default()
                }
                .normalize(WindowDefaults::Open, now()),
            )
            .unwrap();

        assert_eq!(page.items.len(), 50);
        assert_eq!(page.total, 250);
        assert_eq!(page.total_pages(), 3);
        // Newest first, so page three ends with the oldest entry.
        assert_eq!(page.items.last().unwrap().message, "entry 249");
    }

    #[test]
    fn pages_agree_with_in_memory_filter_and_sort() {
        let store = Store::open_in_memory().unwrap();
        let all = seeded(&store);

        let filters = [
            FilterSpec::default(),
            FilterSpec {
                level: Some(4),
                ..FilterSpec::default()
            },
            FilterSpec {
                has_stack_trace: Some(false),
                sort_by: Some("level".into()),
                sort_dir: Some("asc".into()),
                ..FilterSpec::default()
            },
            FilterSpec {
                search: Some("timeout".into()),
                sort_by: Some("programName".into()),
                ..FilterSpec::default()
            },
            FilterSpec {
                program_name: Some("Back".into()),
                system_details: Some("WS-02".into()),
                from: Some(now() - Duration::hours(30)),
                ..FilterSpec::default()
            },
            FilterSpec {
                windows_version: Some("19045".into()),
                page_size: Some(3),
                page: Some(2),
                ..FilterSpec::default()
            },
        ];

        for filter in filters {
            let q = filter.normalize(WindowDefaults::Open, now());
            let mut expected: Vec<_> = all.iter().filter(|e| q.predicate.matches(e)).cloned().collect();
            expected.sort_by(|a, b| q.sort.compare(a, b));
            let total = expected.len() as u64;
            let expected: Vec<_> = expected
                .into_iter()
                .skip(q.offset() as usize)
                .take(q.page_size as usize)
                .collect();

            let page = store.fetch_page(&q).unwrap();
            assert_eq!(page.total, total, "total for {filter:?}");
            assert_eq!(page.items, expected, "items for {filter:?}");
        }
    }

    #[test]
    fn has_stack_trace_false_includes_empty_traces() {
        let store = Store::open_in_memory().unwrap();
        let mut blank = testkit::entry_at("blank trace", 4, now());
        blank.stack_trace = Some(String::new());
        let mut real = testkit::entry_at("real trace", 4, now());
        real.stack_trace = Some("at Job.Run()".into());
        store
            .insert_logs(&[blank, real, testkit::entry_at("no trace", 2, now())])
            .unwrap();

        let page = store
            .fetch_page(
                &FilterSpec {
                    has_stack_trace: Some(false),
                    ..FilterSpec::default()
                }
                .normalize(WindowDefaults::Open, now()),
            )
            .unwrap();
        let mut messages: Vec<_> = page.items.iter().map(|e| e.message.as_str()).collect();
        messages.sort();
        assert_eq!(messages, ["blank trace", "no trace"]);
    }

    #[test]
    fn browsing_defaults_hide_old_entries() {
        let store = Store::open_in_memory().unwrap();
        let recent = Utc::now() - Duration::hours(1);
        let stale = Utc::now() - Duration::days(3);
        store
            .insert_logs(&[
                testkit::entry_at("recent", 2, recent),
                testkit::entry_at("stale", 2, stale),
            ])
            .unwrap();

        let page = store
            .query(&FilterSpec::default(), WindowDefaults::LastDay)
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].message, "recent");
        assert!(page.window.from.is_some());

        let page = store
            .query(&FilterSpec::default(), WindowDefaults::Open)
            .unwrap();
        assert_eq!(page.total, 2);
    }

    #[test]
    fn get_log_misses_are_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.get_log(42).unwrap_err();
        assert!(matches!(err, LogbookError::NotFound(_)));
    }

    #[test]
    fn stats_count_each_severity() {
        let store = Store::open_in_memory().unwrap();
        let ts = now() - Duration::hours(2);
        store
            .insert_logs(&[
                testkit::entry_at("a", 2, ts),
                testkit::entry_at("b", 2, ts),
                testkit::entry_at("c", 4, ts),
                testkit::entry_at("old", 5, now() - Duration::days(10)),
            ])
            .unwrap();

        let StatsResponse::Rolling {
            last_day,
            last_week,
            last_month,
        } = store.stats_at(&StatsRequest::default(), now()).unwrap()
        else {
            panic!("expected rolling stats");
        };
        assert_eq!(last_day.information, 2);
        assert_eq!(last_day.error, 1);
        assert_eq!(last_day.total, 3);
        assert_eq!(last_week.total, 3);
        assert_eq!(last_month.get(Severity::Critical), 1);
        assert_eq!(last_month.total, 4);
    }

    #[test]
    fn stats_period_uses_requested_bounds() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_logs(&[
                testkit::entry_at("in", 3, now() - Duration::days(40)),
                testkit::entry_at("out", 3, now() - Duration::days(50)),
            ])
            .unwrap();

        let res = store
            .stats_at(
                &StatsRequest {
                    from: Some(Some(now() - Duration::days(45))),
                    to: None,
                },
                now(),
            )
            .unwrap();
        let StatsResponse::Period { period } = res else {
            panic!("expected period stats");
        };
        assert_eq!(period.warning, 1);
        assert_eq!(period.total, 1);
    }

    #[test]
    fn unknown_levels_do_not_count() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_logs(&[
                testkit::entry_at("odd", 9, now()),
                testkit::entry_at("fine", 1, now()),
            ])
            .unwrap();
        let counts = store
            .severity_counts(&LogPredicate::within(TimeWindow::all()))
            .unwrap();
        assert_eq!(counts.debug, 1);
        assert_eq!(counts.total, 1);
    }

    #[test]
    fn systems_are_grouped_and_ordered_by_activity() {
        let store = Store::open_in_memory().unwrap();
        let mut blank = testkit::entry_at("no system", 2, now());
        blank.system_details = "  ".into();
        let mut entries = vec![
            testkit::entry_at("a", 2, now() - Duration::hours(5)),
            testkit::entry_at("b", 2, now() - Duration::hours(1)),
            testkit::entry_at("c", 2, now() - Duration::hours(3)),
            blank,
        ];
        entries[0].system_details = "WS-01".into();
        entries[1].system_details = "WS-02".into();
        entries[2].system_details = "WS-01".into();
        store.insert_logs(&entries).unwrap();

        let systems = store.distinct_systems(&SystemsRequest::default()).unwrap();
        assert_eq!(systems.len(), 2);
        assert_eq!(systems[0].system_details, "WS-02");
        assert_eq!(systems[1].system_details, "WS-01");
        assert_eq!(systems[1].count, 2);
        assert_eq!(systems[1].last_log_at, now() - Duration::hours(3));

        let windowed = store
            .distinct_systems(&SystemsRequest {
                from: Some(now() - Duration::hours(2)),
                ..SystemsRequest::default()
            })
            .unwrap();
        assert_eq!(windowed.len(), 1);

        assert_eq!(store.system_names().unwrap(), ["WS-01", "WS-02"]);
    }

    #[test]
    fn oldest_returns_earliest_first() {
        let store = Store::open_in_memory().unwrap();
        seeded(&store);
        let oldest = store.oldest(&OldestRequest { count: Some(2) }).unwrap();
        assert_eq!(oldest.len(), 2);
        assert!(oldest[0].created_at <= oldest[1].created_at);

        let by_time = SortSpec {
            key: SortKey::CreatedAt,
            desc: false,
        };
        let page = store
            .fetch_page(
                &FilterSpec {
                    sort_dir: Some("asc".into()),
                    ..FilterSpec::default()
                }
                .normalize(WindowDefaults::Open, now()),
            )
            .unwrap();
        assert_eq!(page.items[0].id, oldest[0].id);
        assert!(by_time.compare(&page.items[0], &page.items[1]).is_le());
    }
}
