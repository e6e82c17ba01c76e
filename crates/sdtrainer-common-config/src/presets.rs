//! Built-in LoRA training presets.

use crate::types::LoraPreset;
use serde_json::{json, Map, Value};

/// Name of the preset every new train config starts from.
pub const DEFAULT_PRESET_NAME: &str = "default";

/// The `default` preset: a conservative SD 1.5 LoRA recipe.
pub fn default_preset() -> LoraPreset {
    let params = json!({
        "network_module": "networks.lora",
        "train_batch_size": 1,
        "caption_extension": ".txt",
        "mixed_precision": "fp16",
        "save_precision": "fp16",
        "cache_latents": true,
        "seed": 1234,
        "learning_rate": 0.0001,
        "lr_scheduler": "constant",
        "optimizer_type": "AdamW8bit",
        "text_encoder_lr": 0.00005,
        "unet_lr": 0.0001,
        "network_dim": 128,
        "network_alpha": 128,
        "resolution": "512,512",
        "gradient_accumulation_steps": 1,
        "prior_loss_weight": 1,
        "lr_scheduler_num_cycles": 1,
        "lr_scheduler_power": 1,
        "clip_skip": 1,
        "max_token_length": 150,
        "xformers": true,
        "bucket_no_upscale": true,
        "bucket_reso_steps": 64,
        "vae_batch_size": 1,
        "max_data_loader_n_workers": 8,
        "sample_sampler": "euler_a",
        "save_every_n_steps": 100
    });

    let params = match params {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    LoraPreset {
        name: DEFAULT_PRESET_NAME.to_string(),
        params,
        built_in: true,
    }
}

/// All presets shipped with the application.
pub fn builtin_presets() -> Vec<LoraPreset> {
    vec![default_preset()]
}

/// Insert `preset` into `stored`, or merge its params into the preset of the same name.
///
/// New presets go to the front. A merged preset is no longer considered built-in.
pub fn upsert_preset(stored: &mut Vec<LoraPreset>, preset: LoraPreset) {
    match stored.iter_mut().find(|p| p.name == preset.name) {
        Some(existing) => {
            existing.params.extend(preset.params);
            existing.built_in = false;
        }
        None => stored.insert(0, preset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_preset_values() {
        let preset = default_preset();
        assert!(preset.built_in);
        assert_eq!(preset.params["network_module"], "networks.lora");
        assert_eq!(preset.params["resolution"], "512,512");
        assert_eq!(preset.params["xformers"], true);
        assert_eq!(preset.params["network_dim"], 128);
    }

    #[test]
    fn test_upsert_new_goes_first() {
        let mut stored = vec![LoraPreset::new("a", Map::new())];
        upsert_preset(&mut stored, LoraPreset::new("b", Map::new()));
        assert_eq!(stored[0].name, "b");
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn test_upsert_merges_params() {
        let mut first = Map::new();
        first.insert("seed".into(), json!(1));
        first.insert("network_dim".into(), json!(32));
        let mut stored = vec![LoraPreset {
            name: "mine".into(),
            params: first,
            built_in: true,
        }];

        let mut update = Map::new();
        update.insert("seed".into(), json!(42));
        upsert_preset(&mut stored, LoraPreset::new("mine", update));

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].params["seed"], 42);
        assert_eq!(stored[0].params["network_dim"], 32);
        assert!(!stored[0].built_in);
    }

    proptest! {
        #[test]
        fn prop_upsert_keeps_names_unique(names in prop::collection::vec("[a-c]", 0..12)) {
            let mut stored = Vec::new();
            for name in &names {
                upsert_preset(&mut stored, LoraPreset::new(name.as_str(), Map::new()));
            }
            let mut seen: Vec<&str> = stored.iter().map(|p| p.name.as_str()).collect();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), stored.len());
            for name in &names {
                prop_assert!(stored.iter().any(|p| &p.name == name));
            }
        }
    }
}
