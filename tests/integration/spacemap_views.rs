#![allow(missing_docs)]

use poolscope::{
    explore::{BinRequest, OpFilter, RangeEntry, RangeRequest, RecordFilter},
    provider::{MemoryLog, MemoryObject, MemoryPool, SpaceMapRecord, SpaceOp},
    types::ObjectId,
    ErrorCode, PoolSession,
};

const MAP: u64 = 31;

fn record(offset: u64, length: u64, op: SpaceOp, txg: u64) -> SpaceMapRecord {
    SpaceMapRecord {
        offset,
        length,
        op,
        txg,
        sync_pass: 1,
        device_id: Some(0),
    }
}

fn session_with(log: MemoryLog) -> PoolSession {
    PoolSession::new(MemoryPool::new("tank").with_object(MemoryObject::space_map(MAP, log)))
}

/// Forty records alternating alloc/free with growing lengths, 64 KiB apart.
fn busy_log() -> MemoryLog {
    let records = (0..40u64).map(|i| {
        let op = if i % 3 == 2 { SpaceOp::Free } else { SpaceOp::Alloc };
        record(i * 65_536, 512 * (i + 1), op, 100 + i / 4)
    });
    MemoryLog::new(0, 40 * 65_536).records(records)
}

fn ranges(session: &PoolSession, cursor: u64, limit: u64, filter: RecordFilter) -> Vec<RangeEntry> {
    session
        .spacemap_ranges(&RangeRequest {
            cursor: Some(cursor),
            limit: Some(limit),
            filter,
            ..RangeRequest::new(ObjectId(MAP))
        })
        .unwrap()
        .ranges
}

#[test]
fn two_record_summary() {
    let session = session_with(MemoryLog::new(0, 1 << 20).records([
        record(0, 100, SpaceOp::Alloc, 5),
        record(100, 50, SpaceOp::Free, 6),
    ]));
    let summary = session.spacemap_summary(ObjectId(MAP)).unwrap();
    assert_eq!(summary.alloc_entries, 1);
    assert_eq!(summary.free_entries, 1);
    assert_eq!(summary.alloc_bytes, 100);
    assert_eq!(summary.free_bytes, 50);
    assert_eq!(summary.net_bytes, 50);
    assert_eq!(summary.range_entries, 2);
    assert_eq!(summary.txg.min(), Some(5));
    assert_eq!(summary.txg.max(), Some(6));

    let buckets: Vec<_> = summary
        .histogram
        .iter()
        .map(|b| (b.bucket, b.alloc_count, b.free_count))
        .collect();
    assert_eq!(buckets, vec![(5, 0, 1), (6, 1, 0)]);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["txg_min"], 5);
    assert_eq!(json["txg_max"], 6);
    assert_eq!(json["object_id"], MAP);
}

#[test]
fn summary_totals_are_conserved() {
    let session = session_with(busy_log());
    let summary = session.spacemap_summary(ObjectId(MAP)).unwrap();
    assert_eq!(
        i128::from(summary.alloc_bytes) - i128::from(summary.free_bytes),
        summary.net_bytes
    );
    let histogram_total: u64 = summary
        .histogram
        .iter()
        .map(|b| b.alloc_count + b.free_count)
        .sum();
    assert_eq!(histogram_total, summary.range_entries);
    assert_eq!(summary.range_entries, 40);
}

#[test]
fn consecutive_pages_have_no_gaps() {
    let session = session_with(busy_log());
    for filter in [
        RecordFilter::default(),
        RecordFilter::from_params(Some("alloc"), None, None, None).unwrap(),
        RecordFilter::from_params(None, Some(4096), Some(102), Some(108)).unwrap(),
    ] {
        for split in [1, 7, 13] {
            let mut joined = ranges(&session, 0, split, filter);
            joined.extend(ranges(&session, split, 25, filter));
            let single = ranges(&session, 0, split + 25, filter);
            assert_eq!(joined, single, "split {split} filter {filter:?}");
        }
    }
}

#[test]
fn filters_hold_on_every_returned_record() {
    let session = session_with(busy_log());
    let allocs = ranges(
        &session,
        0,
        100,
        RecordFilter::from_params(Some("ALLOC"), None, None, None).unwrap(),
    );
    assert!(!allocs.is_empty());
    assert!(allocs.iter().all(|r| r.op == SpaceOp::Alloc));

    let long = ranges(
        &session,
        0,
        100,
        RecordFilter::from_params(None, Some(10_000), None, None).unwrap(),
    );
    assert!(long.iter().all(|r| r.length >= 10_000));
    // Indexes count matches; positions count every record seen.
    assert_eq!(long[0].index, 0);
    assert_eq!(long[0].position, 19);

    let err = RecordFilter::from_params(None, None, Some(9), Some(3)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    let err = RecordFilter::from_params(Some("trim"), None, None, None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[test]
fn one_bin_over_the_map_matches_the_summary() {
    let session = session_with(busy_log());
    let summary = session.spacemap_summary(ObjectId(MAP)).unwrap();
    let page = session
        .spacemap_bins(&BinRequest {
            bin_size: Some(64 << 20),
            ..BinRequest::new(ObjectId(MAP))
        })
        .unwrap();
    assert_eq!(page.total_bins, Some(1));
    assert_eq!(page.bins[0].alloc_bytes, summary.alloc_bytes);
    assert_eq!(page.bins[0].free_bytes, summary.free_bytes);
    assert_eq!(page.bins[0].alloc_ops, summary.alloc_entries);

    let free_only = session
        .spacemap_bins(&BinRequest {
            bin_size: Some(64 << 20),
            filter: RecordFilter {
                op: OpFilter::Free,
                ..RecordFilter::default()
            },
            ..BinRequest::new(ObjectId(MAP))
        })
        .unwrap();
    assert_eq!(free_only.bins[0].alloc_bytes, 0);
    assert_eq!(free_only.bins[0].free_bytes, summary.free_bytes);
}

#[test]
fn bins_sum_to_the_summary_at_any_size() {
    let session = session_with(busy_log());
    let summary = session.spacemap_summary(ObjectId(MAP)).unwrap();
    for bin_size in [512u64, 4096, 65_536, 1 << 20] {
        let mut cursor = 0;
        let mut alloc = 0u64;
        loop {
            let page = session
                .spacemap_bins(&BinRequest {
                    bin_size: Some(bin_size),
                    cursor: Some(cursor),
                    limit: Some(2048),
                    ..BinRequest::new(ObjectId(MAP))
                })
                .unwrap();
            alloc += page.bins.iter().map(|b| b.alloc_bytes).sum::<u64>();
            match page.next {
                Some(next) => cursor = next,
                None => break,
            }
        }
        assert_eq!(alloc, summary.alloc_bytes, "bin size {bin_size}");
    }
}

#[test]
fn records_at_the_top_of_the_address_space_saturate() {
    let start = u64::MAX - 4096;
    let session = session_with(
        MemoryLog::new(start, 4096).record(record(u64::MAX - 10, 100, SpaceOp::Alloc, 9)),
    );
    let summary = session.spacemap_summary(ObjectId(MAP)).unwrap();
    assert_eq!(summary.alloc_bytes, 100);

    let page = session
        .spacemap_bins(&BinRequest {
            bin_size: Some(512),
            ..BinRequest::new(ObjectId(MAP))
        })
        .unwrap();
    assert_eq!(page.total_bins, Some(8));
    let last = page.bins.last().unwrap();
    assert_eq!(last.index, 7);
    assert_eq!(last.offset, u64::MAX - 512);
    assert_eq!(last.alloc_bytes, 10);
    assert!(page.bins[..7].iter().all(|b| b.alloc_bytes == 0));
}

#[test]
fn scans_abort_on_mid_log_failure() {
    let session = session_with(busy_log().fail_after(12));
    let err = session.spacemap_summary(ObjectId(MAP)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);

    let err = session
        .spacemap_ranges(&RangeRequest {
            limit: Some(100),
            ..RangeRequest::new(ObjectId(MAP))
        })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);

    let err = session
        .spacemap_bins(&BinRequest::new(ObjectId(MAP)))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);
}

#[test]
fn wrong_object_kinds_are_unsupported() {
    let pool = MemoryPool::new("tank")
        .with_object(MemoryObject::new(4, 19))
        .with_object(MemoryObject::space_map(5, MemoryLog::new(0, 4096)).header_len(8));
    let session = PoolSession::new(pool);

    let err = session.spacemap_summary(ObjectId(4)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unsupported);
    assert!(err.message().contains("plain file contents"));

    let err = session.spacemap_summary(ObjectId(5)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unsupported);

    let err = session.spacemap_summary(ObjectId(6)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn bins_see_records_supplied_out_of_order() {
    let session = session_with(
        MemoryLog::new(0, 8192)
            .records([record(4096, 100, SpaceOp::Alloc, 5)])
            .record(record(0, 100, SpaceOp::Alloc, 5)),
    );
    let summary = session.spacemap_summary(ObjectId(MAP)).unwrap();
    let page = session
        .spacemap_bins(&BinRequest {
            bin_size: Some(512),
            limit: Some(2),
            ..BinRequest::new(ObjectId(MAP))
        })
        .unwrap();
    assert_eq!(summary.alloc_bytes, 200);
    assert_eq!(page.bins[0].alloc_bytes, 100);

    let total: u64 = (0..16)
        .step_by(4)
        .flat_map(|cursor| {
            session
                .spacemap_bins(&BinRequest {
                    bin_size: Some(512),
                    cursor: Some(cursor),
                    limit: Some(4),
                    ..BinRequest::new(ObjectId(MAP))
                })
                .unwrap()
                .bins
        })
        .map(|bin| bin.alloc_bytes)
        .sum();
    assert_eq!(total, summary.alloc_bytes);
}
