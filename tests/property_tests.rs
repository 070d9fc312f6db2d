mod common;

use bytes::Bytes;
use common::{fixture, png_bytes};
use img_squeeze_vault::batch::{
    bounded_dimensions, select_output, unique_output_name, BatchPolicy, BatchRequest, UploadItem,
};
use img_squeeze_vault::codec::Compressed;
use img_squeeze_vault::formats::OutputFormat;
use img_squeeze_vault::validation::{is_safe_file_name, resolve_quality, sanitize_stem};
use proptest::prelude::*;
use std::collections::HashSet;

proptest! {
    #[test]
    fn quality_always_lands_in_range(raw in any::<i64>(), floor in 1u8..=100u8) {
        let q = resolve_quality(Some(&raw.to_string()), floor, 78);
        prop_assert!(q >= floor && q <= 100);
        if raw >= i64::from(floor) && raw <= 100 {
            prop_assert_eq!(i64::from(q), raw);
        }
    }

    #[test]
    fn garbage_quality_uses_default(raw in "[a-zA-Z ]{0,12}") {
        prop_assert_eq!(resolve_quality(Some(&raw), 1, 78), 78);
    }

    #[test]
    fn selected_output_never_exceeds_input(original_len in 0usize..4096, output_len in 0usize..4096) {
        let original = Bytes::from(vec![1u8; original_len]);
        let compressed = Compressed {
            bytes: vec![2u8; output_len],
            extension: "webp",
            input_size: original_len as u64,
            output_size: output_len as u64,
        };
        let selected = select_output(&original, compressed, OutputFormat::Png);

        prop_assert!(selected.output_bytes <= selected.original_bytes);
        prop_assert_eq!(
            selected.saved_bytes,
            (original_len as u64).saturating_sub(output_len as u64)
        );
        prop_assert_eq!(selected.bytes.len() as u64, selected.output_bytes);
        if output_len > original_len {
            prop_assert_eq!(selected.extension, "png");
            prop_assert_eq!(&selected.bytes, &original);
        }
    }

    #[test]
    fn sanitized_stems_are_servable(name in any::<String>(), ext in "(jpg|png|webp|avif)") {
        let stem = sanitize_stem(&name);
        prop_assert!(!stem.is_empty());
        prop_assert!(stem.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
        let file_name = format!("{}.{}", stem, ext);
        prop_assert!(is_safe_file_name(&file_name));
    }

    #[test]
    fn output_names_stay_unique(stems in proptest::collection::vec("[ab]{1,2}", 1..30)) {
        let mut taken = HashSet::new();
        let names: Vec<_> = stems
            .iter()
            .map(|stem| unique_output_name(stem, "webp", &mut taken))
            .collect();
        let distinct: HashSet<_> = names.iter().collect();
        prop_assert_eq!(distinct.len(), names.len());
    }

    #[test]
    fn bounded_dimensions_only_for_oversized(w in 1u32..10_000, h in 1u32..10_000, max in 1u32..8_000) {
        match bounded_dimensions(w, h, max) {
            Some(bounds) => {
                prop_assert!(w > max || h > max);
                prop_assert_eq!(bounds, (max, max));
            }
            None => prop_assert!(w <= max && h <= max),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn every_item_yields_one_outcome(kinds in proptest::collection::vec(any::<bool>(), 1..6)) {
        let f = fixture();
        let items: Vec<_> = kinds
            .iter()
            .enumerate()
            .map(|(i, is_image)| {
                let bytes = if *is_image { png_bytes(6, 6) } else { b"nope".to_vec() };
                UploadItem::new(format!("item-{}.png", i), bytes)
            })
            .collect();
        let request = BatchRequest::resolve(Some("png"), None, &BatchPolicy::default()).unwrap();

        let outcome = f.processor.process(items, &request).unwrap();

        prop_assert_eq!(outcome.outcomes.len(), kinds.len());
        prop_assert_eq!(outcome.success_count(), kinds.iter().filter(|k| **k).count());
        for (i, item) in outcome.outcomes.iter().enumerate() {
            prop_assert_eq!(item.original_name(), format!("item-{}.png", i));
        }
    }
}
