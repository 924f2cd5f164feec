/// Settings and focus-mode blocklist commands
use anyhow::{Context, Result};
use tabled::{Table, Tabled};
use tabscope_storage::{Database, Settings};

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "Key")]
    key: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn rows(settings: &Settings) -> Vec<SettingRow> {
    vec![
        SettingRow {
            key: "session_persistence",
            value: settings.session_persistence.to_string(),
        },
        SettingRow {
            key: "focus_duration_minutes",
            value: settings.focus_duration_minutes.to_string(),
        },
        SettingRow {
            key: "autosave_interval_minutes",
            value: settings.autosave_interval_minutes.to_string(),
        },
        SettingRow {
            key: "detection_threshold",
            value: format!("{:.2}", settings.detection_threshold),
        },
        SettingRow {
            key: "blocklist",
            value: format!("{} sites", settings.blocklist.len()),
        },
    ]
}

/// Parse `value` into the field named by `key`
fn apply_setting(settings: &mut Settings, key: &str, value: &str) -> Result<()> {
    match key {
        "session_persistence" => {
            settings.session_persistence = value
                .parse()
                .with_context(|| format!("Expected true or false, got '{value}'"))?;
        }
        "focus_duration_minutes" => {
            settings.focus_duration_minutes = value
                .parse()
                .with_context(|| format!("Expected minutes, got '{value}'"))?;
        }
        "autosave_interval_minutes" => {
            settings.autosave_interval_minutes = value
                .parse()
                .with_context(|| format!("Expected minutes, got '{value}'"))?;
        }
        "detection_threshold" => {
            let threshold: f32 = value
                .parse()
                .with_context(|| format!("Expected a number, got '{value}'"))?;
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("detection_threshold must be between 0 and 1");
            }
            settings.detection_threshold = threshold;
        }
        "blocklist" => anyhow::bail!("Use `tabscope blocklist add|remove` to edit the blocklist"),
        _ => anyhow::bail!("Unknown setting: {key}"),
    }
    Ok(())
}

pub fn handle_show(db: &Database) -> Result<()> {
    let settings = db.get_settings()?;
    println!("{}", Table::new(rows(&settings)));
    Ok(())
}

pub fn handle_set(db: &Database, key: &str, value: &str) -> Result<()> {
    let mut settings = db.get_settings()?;
    apply_setting(&mut settings, key, value)?;
    db.update_settings(&settings)?;
    println!("Set {key} = {value}");
    Ok(())
}

pub fn handle_blocklist_list(db: &Database) -> Result<()> {
    let settings = db.get_settings()?;
    if settings.blocklist.is_empty() {
        println!("Blocklist is empty.");
        return Ok(());
    }
    for site in &settings.blocklist {
        println!("  {site}");
    }
    Ok(())
}

pub fn handle_blocklist_add(db: &Database, site: &str) -> Result<()> {
    let mut settings = db.get_settings()?;
    let before = settings.blocklist.len();
    settings.blocklist.push(site.to_string());
    let saved = db.update_settings(&settings)?;

    if saved.blocklist.len() > before {
        println!("Blocked {}", site.trim().to_ascii_lowercase());
    } else {
        println!("{site} is already blocked");
    }
    println!("Takes effect the next time focus mode is enabled.");
    Ok(())
}

pub fn handle_blocklist_remove(db: &Database, site: &str) -> Result<()> {
    let mut settings = db.get_settings()?;
    let needle = site.trim().to_ascii_lowercase();
    let before = settings.blocklist.len();
    settings.blocklist.retain(|s| *s != needle);

    if settings.blocklist.len() == before {
        println!("{site} is not in the blocklist");
        return Ok(());
    }
    db.update_settings(&settings)?;
    println!("Unblocked {needle}");
    Ok(())
}
