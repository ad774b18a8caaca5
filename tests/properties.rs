use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use autopatcher::collect::pick_most_recent;
use autopatcher::config::provider::SECTION_PARAMETERS;
use autopatcher::config::ConfigProvider;
use autopatcher::process::select_target_process;
use autopatcher::process::table::normalize_image_name;
use autopatcher::pipeline::records::parse_ammo_map;
use autopatcher_test_utils::fakes::process;
use proptest::prelude::*;

fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

proptest! {
    #[test]
    fn numeric_lookup_never_panics(raw in "[ -~]{0,24}", default in any::<u64>()) {
        let toml = format!("[Parameters]\nvalue = {:?}\n", raw);
        let cfg = ConfigProvider::from_toml_str("/p/autopatcher.toml", &toml)
            .expect("string values always parse");
        let value: u64 = cfg.resolve_numeric(SECTION_PARAMETERS, "value", default);
        if let Ok(parsed) = raw.trim().parse::<u64>() {
            prop_assert_eq!(value, parsed);
        }
    }

    #[test]
    fn most_recent_is_never_beaten(times in prop::collection::vec(0u64..50, 1..12)) {
        let candidates: Vec<(PathBuf, SystemTime)> = times
            .iter()
            .enumerate()
            .map(|(i, t)| (PathBuf::from(format!("/dir{i}/out.json")), at(*t)))
            .collect();

        let picked = pick_most_recent(&candidates).expect("non-empty input");
        let index = candidates.iter().position(|(p, _)| p == picked).expect("picked from input");
        let newest = *times.iter().max().expect("non-empty");

        prop_assert_eq!(times[index], newest);
        // Ties resolve to the first (highest-priority) directory.
        prop_assert!(times[..index].iter().all(|t| *t < newest));
    }

    #[test]
    fn image_names_ignore_case_dirs_and_exe(
        dir in "[A-Za-z0-9 ]{0,12}",
        stem in "[A-Za-z0-9_-]{1,20}",
    ) {
        let bare = normalize_image_name(&stem);
        prop_assert_eq!(normalize_image_name(&stem.to_uppercase()), bare.clone());
        prop_assert_eq!(normalize_image_name(&format!("{stem}.EXE")), bare.clone());
        prop_assert_eq!(normalize_image_name(&format!("C:\\{dir}\\{stem}.exe")), bare.clone());
        prop_assert_eq!(normalize_image_name(&format!("/{dir}/{stem}")), bare.clone());
        prop_assert!(!bare.contains('/') && !bare.contains('\\'));
    }

    #[test]
    fn selection_never_returns_stale_or_foreign(
        starts in prop::collection::vec((0u64..100, any::<bool>()), 0..10),
        launched in 10u64..90,
    ) {
        let table: Vec<_> = starts
            .iter()
            .enumerate()
            .map(|(i, (t, ours))| {
                let name = if *ours { "FO4Edit.exe" } else { "explorer.exe" };
                process(i as u32 + 1, name, at(*t))
            })
            .collect();

        let tolerance = Duration::from_secs(1);
        if let Some(found) = select_target_process(&table, "fo4edit", at(launched), tolerance) {
            prop_assert!(found.matches_image("FO4Edit.exe"));
            prop_assert!(found.started_at >= at(launched - 1));
            for other in table.iter().filter(|p| p.matches_image("fo4edit")) {
                if other.started_at >= at(launched - 1) {
                    prop_assert!(found.started_at <= other.started_at);
                }
            }
        } else {
            prop_assert!(table
                .iter()
                .all(|p| !p.matches_image("fo4edit") || p.started_at < at(launched - 1)));
        }
    }

    #[test]
    fn ammo_map_keys_are_lower_case(pairs in prop::collection::vec(("[0-9A-Fa-f]{8}", "[0-9A-Fa-f]{8}"), 0..8)) {
        let mut text = String::from("[UnmappedAmmo]\n");
        for (k, v) in &pairs {
            text.push_str(&format!("{k} = {v}\n"));
        }
        let map = parse_ammo_map(&text);
        prop_assert!(map.len() <= pairs.len());
        for (k, v) in &map {
            prop_assert_eq!(k, &k.to_lowercase());
            prop_assert_eq!(v, &v.to_lowercase());
        }
    }
}
