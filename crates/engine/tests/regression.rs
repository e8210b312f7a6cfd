//! End-to-end behaviour of the regression coordinator

mod common;

use std::sync::Arc;

use common::*;
use test_case::test_case;
use visreg_engine::{
    cluster, diff, BaselineStore, BlobStore, BoundingBox, CaptureFormat, CaptureTarget, DiffOptions,
    ErrorKind, MemoryBlobStore, Namespace, Region, TestName, VisregError,
};

#[tokio::test]
async fn test_first_comparison_creates_baseline() {
    let current = solid(8, 8, [40, 80, 120, 255]);
    let (coordinator, _renderer, _blobs) = coordinator(current.clone());

    let verdict = coordinator
        .compare_with_baseline("new-test", &CaptureTarget::viewport(), &DiffOptions::default())
        .await
        .unwrap();

    assert!(!verdict.is_different);
    assert!(verdict.baseline_created);
    assert_eq!(verdict.similarity_percent, 100.0);
    assert_eq!(verdict.total_pixels, 0);
    assert_eq!(verdict.different_pixels, 0);
    assert!(verdict.regions.is_empty());

    let stored = coordinator.get_baseline("new-test").await.unwrap();
    assert_eq!(stored, Some(current));
}

#[tokio::test]
async fn test_black_block_regression() {
    let baseline = solid(4, 4, WHITE);
    let (coordinator, renderer, _blobs) = coordinator(baseline.clone());

    coordinator
        .compare_with_baseline("block", &CaptureTarget::viewport(), &DiffOptions::default())
        .await
        .unwrap();

    renderer.set_current(paint_rect(&baseline, 1, 1, 2, 2, BLACK));
    let verdict = coordinator
        .compare_with_baseline("block", &CaptureTarget::viewport(), &DiffOptions::default())
        .await
        .unwrap();

    assert!(verdict.is_different);
    assert!(!verdict.baseline_created);
    assert_eq!(verdict.total_pixels, 16);
    assert_eq!(verdict.different_pixels, 4);
    assert_eq!(verdict.similarity_percent, 75.0);
    assert_eq!(verdict.regions, vec![Region { x: 1, y: 1, width: 2, height: 2 }]);
    assert!(verdict.diff_visualization.is_some());
}

#[tokio::test]
async fn test_unchanged_capture_passes() {
    let (coordinator, _renderer, _blobs) = coordinator(solid(6, 6, WHITE));
    let options = DiffOptions::default();

    coordinator
        .compare_with_baseline("stable", &CaptureTarget::viewport(), &options)
        .await
        .unwrap();
    let verdict = coordinator
        .compare_with_baseline("stable", &CaptureTarget::viewport(), &options)
        .await
        .unwrap();

    assert!(!verdict.is_different);
    assert_eq!(verdict.total_pixels, 36);
    assert_eq!(verdict.similarity_percent, 100.0);
    assert!(verdict.diff_visualization.is_none());
}

#[tokio::test]
async fn test_dimension_mismatch_is_distinct_error() {
    let (coordinator, renderer, _blobs) = coordinator(solid(100, 100, WHITE));

    coordinator
        .compare_with_baseline("resized", &CaptureTarget::viewport(), &DiffOptions::default())
        .await
        .unwrap();

    renderer.set_current(solid(100, 101, WHITE));
    let err = coordinator
        .compare_with_baseline("resized", &CaptureTarget::viewport(), &DiffOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    match err {
        VisregError::DimensionMismatch { name, baseline, current } => {
            assert_eq!(name.as_deref(), Some("resized"));
            assert_eq!((baseline.width, baseline.height), (100, 100));
            assert_eq!((current.width, current.height), (100, 101));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_capture_failure_leaves_baselines_untouched() {
    let (coordinator, renderer, blobs) = coordinator(solid(2, 2, WHITE));
    renderer.set_available(false);

    let err = coordinator
        .compare_with_baseline("offline", &CaptureTarget::viewport(), &DiffOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, VisregError::SurfaceUnavailable { .. }));
    assert!(blobs.is_empty().await);
}

#[tokio::test]
async fn test_missing_element_propagates() {
    let (coordinator, _renderer, blobs) = coordinator(solid(2, 2, WHITE));

    let err = coordinator
        .compare_with_baseline("card", &CaptureTarget::element("#card"), &DiffOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, VisregError::ElementNotFound { .. }));
    assert!(blobs.is_empty().await);
}

#[tokio::test]
async fn test_element_capture_compares() {
    let (coordinator, renderer, _blobs) = coordinator(solid(3, 3, WHITE));
    renderer.add_element("#card", BoundingBox { x: 5.0, y: 5.0, width: 3.0, height: 3.0 });

    let target = CaptureTarget::element("#card").with_padding(2);
    let verdict = coordinator
        .compare_with_baseline("card", &target, &DiffOptions::default())
        .await
        .unwrap();
    assert!(verdict.baseline_created);
}

#[tokio::test]
async fn test_invalid_names_rejected_before_capture() {
    let (coordinator, renderer, blobs) = coordinator(solid(2, 2, WHITE));

    for name in ["", "../escape", "nested/name"] {
        let err = coordinator
            .compare_with_baseline(name, &CaptureTarget::viewport(), &DiffOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VisregError::InvalidName { .. }));
    }

    assert_eq!(renderer.capture_count(), 0);
    assert!(blobs.is_empty().await);
}

#[tokio::test]
async fn test_invalid_threshold_rejected_before_capture() {
    let (coordinator, renderer, _blobs) = coordinator(solid(2, 2, WHITE));
    let options = DiffOptions {
        threshold: 2.0,
        ..DiffOptions::default()
    };

    let err = coordinator
        .compare_with_baseline("t", &CaptureTarget::viewport(), &options)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(renderer.capture_count(), 0);
}

#[tokio::test]
async fn test_artifacts_follow_comparisons() {
    let baseline = solid(4, 4, WHITE);
    let (coordinator, renderer, blobs) = coordinator(baseline.clone());
    let name = TestName::parse("art").unwrap();
    let options = DiffOptions::default();

    coordinator
        .compare_with_baseline("art", &CaptureTarget::viewport(), &options)
        .await
        .unwrap();

    let changed = paint_rect(&baseline, 0, 0, 2, 2, BLACK);
    renderer.set_current(changed.clone());
    coordinator
        .compare_with_baseline("art", &CaptureTarget::viewport(), &options)
        .await
        .unwrap();

    assert_eq!(coordinator.artifact(Namespace::Current, "art").await.unwrap(), Some(changed));
    let diff_image = coordinator.artifact(Namespace::Diff, "art").await.unwrap().unwrap();
    assert_eq!(diff_image.pixel(0, 0), [255, 0, 0, 255]);
    assert_eq!(diff_image.pixel(3, 3), [0, 0, 0, 0]);

    // A clean comparison removes the stale diff
    renderer.set_current(baseline);
    coordinator
        .compare_with_baseline("art", &CaptureTarget::viewport(), &options)
        .await
        .unwrap();
    assert!(blobs
        .read_blob(&Namespace::Diff.image_key(&name))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_update_list_delete() {
    let (coordinator, renderer, blobs) = coordinator(solid(2, 2, WHITE));

    coordinator.update_baseline("home", &CaptureTarget::viewport()).await.unwrap();
    coordinator.update_baseline("about", &CaptureTarget::full_surface()).await.unwrap();

    let names: Vec<String> = coordinator
        .list_baselines()
        .await
        .unwrap()
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(names, vec!["about", "home"]);

    let listed = coordinator.list_baseline_metadata().await.unwrap();
    let listed: Vec<_> = listed.iter().map(|m| (m.name.as_str(), m.width, m.height)).collect();
    assert_eq!(listed, vec![("about", 2, 2), ("home", 2, 2)]);

    // Updating replaces the reference, so the next comparison passes
    renderer.set_current(solid(2, 2, BLACK));
    coordinator.update_baseline("home", &CaptureTarget::viewport()).await.unwrap();
    let verdict = coordinator
        .compare_with_baseline("home", &CaptureTarget::viewport(), &DiffOptions::default())
        .await
        .unwrap();
    assert!(!verdict.is_different);

    coordinator.delete_baseline("home").await.unwrap();
    assert_eq!(coordinator.get_baseline("home").await.unwrap(), None);
    assert!(blobs.list_keys("current/home").await.unwrap().is_empty());
    assert!(blobs.list_keys("baseline/home").await.unwrap().is_empty());

    let err = coordinator.delete_baseline("home").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_delete_clears_artifacts_without_baseline() {
    let (coordinator, _renderer, blobs) = coordinator(solid(2, 2, WHITE));
    let name = TestName::parse("gone").unwrap();
    let png = solid(2, 2, BLACK).encode(&CaptureFormat::png()).unwrap();

    // Leftovers from an earlier run whose baseline is already gone
    blobs.write_blob(&Namespace::Current.image_key(&name), &png).await.unwrap();
    blobs.write_blob(&Namespace::Diff.image_key(&name), &png).await.unwrap();

    let err = coordinator.delete_baseline("gone").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(blobs.is_empty().await);
}

#[tokio::test]
async fn test_artifacts_written_under_baseline_lock() {
    let (coordinator, renderer, _blobs) = coordinator(solid(4, 4, WHITE));
    let coordinator = Arc::new(coordinator);
    coordinator
        .compare_with_baseline("locked", &CaptureTarget::viewport(), &DiffOptions::default())
        .await
        .unwrap();

    let changed = paint_rect(&solid(4, 4, WHITE), 0, 0, 2, 2, BLACK);
    renderer.set_current(changed.clone());

    let name = TestName::parse("locked").unwrap();
    let held = coordinator.baselines().lock(&name).await.unwrap();

    let running = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .compare_with_baseline("locked", &CaptureTarget::viewport(), &DiffOptions::default())
                .await
        })
    };

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!running.is_finished());
    assert_eq!(coordinator.artifact(Namespace::Current, "locked").await.unwrap(), None);

    drop(held);
    let verdict = running.await.unwrap().unwrap();
    assert!(verdict.is_different);
    assert_eq!(coordinator.artifact(Namespace::Current, "locked").await.unwrap(), Some(changed));
    assert!(coordinator.artifact(Namespace::Diff, "locked").await.unwrap().is_some());
}

#[tokio::test]
async fn test_concurrent_first_runs_create_one_baseline() {
    let (coordinator, _renderer, _blobs) = coordinator(solid(16, 16, WHITE));
    let coordinator = Arc::new(coordinator);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .compare_with_baseline("race", &CaptureTarget::viewport(), &DiffOptions::default())
                .await
                .unwrap()
        }));
    }

    let mut created = 0;
    for handle in handles {
        let verdict = handle.await.unwrap();
        assert!(!verdict.is_different);
        if verdict.baseline_created {
            created += 1;
        }
    }
    assert_eq!(created, 1);
}

#[tokio::test]
async fn test_baseline_store_serializes_same_name_writers() {
    let store = Arc::new(BaselineStore::new(Arc::new(MemoryBlobStore::new())));
    let name = TestName::parse("shared").unwrap();

    let mut handles = Vec::new();
    for shade in 0..16u8 {
        let store = store.clone();
        let name = name.clone();
        handles.push(tokio::spawn(async move {
            store.update(&name, &solid(4, 4, [shade, shade, shade, 255])).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Image and metadata always come from the same writer
    let buffer = store.get(&name).await.unwrap().unwrap();
    let meta = store.metadata(&name).await.unwrap().unwrap();
    assert_eq!(meta.digest, buffer.digest());
}

#[tokio::test]
async fn test_responsive_compare_uses_per_breakpoint_baselines() {
    let (coordinator, renderer, _blobs) = coordinator(solid(4, 4, WHITE));
    renderer.set_for_width(375, solid(2, 4, WHITE));
    renderer.set_for_width(768, solid(4, 4, WHITE));

    let options = DiffOptions::default();
    let first = coordinator
        .compare_responsive("page", &CaptureTarget::viewport(), &[768, 375], &options)
        .await
        .unwrap();
    assert!(first.values().all(|v| v.baseline_created));

    renderer.set_for_width(375, paint_rect(&solid(2, 4, WHITE), 0, 0, 2, 2, BLACK));
    let second = coordinator
        .compare_responsive("page", &CaptureTarget::viewport(), &[768, 375], &options)
        .await
        .unwrap();

    assert!(second[&375].is_different);
    assert_eq!(second[&375].name.as_str(), "page-375w");
    assert!(!second[&768].is_different);

    let names: Vec<String> = coordinator
        .list_baselines()
        .await
        .unwrap()
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(names, vec!["page-375w", "page-768w"]);
}

#[test]
fn test_compare_is_idempotent() {
    let a = paint_rect(&solid(10, 10, [30, 60, 90, 200]), 2, 2, 3, 3, [200, 10, 10, 255]);
    let result = diff::compare(&a, &a, &DiffOptions::default()).unwrap();
    assert_eq!(result.different_pixels, 0);
    assert_eq!(result.similarity_percent, 100.0);
}

#[test_case(true ; "with anti-aliasing")]
#[test_case(false ; "without anti-aliasing")]
fn test_different_pixel_count_is_symmetric(include_anti_aliasing: bool) {
    let base = paint_rect(&solid(12, 12, WHITE), 0, 0, 5, 12, BLACK);
    let a = paint(&base, &[(5, 3), (5, 4), (5, 5)], [128, 128, 128, 255]);
    let b = paint_rect(&paint(&base, &[(5, 3)], [90, 90, 90, 255]), 8, 8, 3, 2, [0, 0, 255, 255]);

    let options = DiffOptions {
        include_anti_aliasing,
        ..DiffOptions::default()
    };
    let ab = diff::compare(&a, &b, &options).unwrap();
    let ba = diff::compare(&b, &a, &options).unwrap();
    assert_eq!(ab.different_pixels, ba.different_pixels);
}

#[test]
fn test_threshold_is_monotonic() {
    let base = solid(16, 1, [128, 128, 128, 255]);
    // A gradient of increasingly strong changes
    let current = base.map_pixels(|p| {
        for x in 0..16usize {
            let v = 128 + (x as u8) * 8;
            p[x * 4..x * 4 + 3].copy_from_slice(&[v, v, v]);
        }
    });

    let mut previous = u64::MAX;
    for step in 0..=20 {
        let options = DiffOptions {
            threshold: step as f64 / 20.0,
            include_anti_aliasing: true,
            ..DiffOptions::default()
        };
        let count = diff::compare(&base, &current, &options).unwrap().different_pixels;
        assert!(count <= previous, "threshold {} increased count", options.threshold);
        previous = count;
    }
    assert_eq!(previous, 0);
}

#[test_case(0.0, 15 ; "zero threshold flags every change")]
#[test_case(0.1, 12 ; "default threshold")]
#[test_case(1.0, 0 ; "maximum threshold")]
fn test_threshold_cut_off(threshold: f64, expected: u64) {
    let base = solid(16, 1, [128, 128, 128, 255]);
    let current = base.map_pixels(|p| {
        for x in 0..16usize {
            let v = 128 + (x as u8) * 8;
            p[x * 4..x * 4 + 3].copy_from_slice(&[v, v, v]);
        }
    });
    let options = DiffOptions {
        threshold,
        include_anti_aliasing: true,
        ..DiffOptions::default()
    };
    assert_eq!(diff::compare(&base, &current, &options).unwrap().different_pixels, expected);
}

#[test]
fn test_isolated_pixel_yields_no_region() {
    let baseline = solid(9, 9, WHITE);
    let current = paint(&baseline, &[(4, 4)], BLACK);

    let result = diff::compare(&baseline, &current, &DiffOptions::default()).unwrap();
    assert_eq!(result.different_pixels, 1);
    assert!(cluster::cluster(&result.differences).is_empty());
}

#[test]
fn test_regions_cover_clustered_differences() {
    let baseline = solid(20, 20, WHITE);
    let current = paint_rect(
        &paint_rect(&paint(&baseline, &[(0, 19)], BLACK), 2, 2, 3, 4, BLACK),
        10,
        12,
        5,
        2,
        [0, 0, 255, 255],
    );

    let result = diff::compare(&baseline, &current, &DiffOptions::default()).unwrap();
    let regions = cluster::cluster(&result.differences);
    assert_eq!(
        regions,
        vec![
            Region { x: 2, y: 2, width: 3, height: 4 },
            Region { x: 10, y: 12, width: 5, height: 2 },
        ]
    );

    for d in result.differences.iter().filter(|d| (d.x, d.y) != (0, 19)) {
        let owners = regions.iter().filter(|r| r.contains(d.x, d.y)).count();
        assert_eq!(owners, 1, "({}, {}) covered {} times", d.x, d.y, owners);
    }
}
