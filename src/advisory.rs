//! static farming guidance and snapshot-derived notices

use serde::Serialize;

use crate::domain::{Farm, SystemSnapshot};

/// moisture shortfall (points below the set-point) that warrants a warning
pub const DRY_MARGIN: i64 = 10;

#[derive(Clone, Debug, Serialize)]
pub struct Resource {
    pub title: &'static str,
    pub link: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct Practice {
    pub title: &'static str,
    pub details: &'static str,
    pub resources: Vec<Resource>,
}

#[derive(Clone, Debug, Serialize)]
pub struct InfoSection {
    pub title: &'static str,
    pub description: &'static str,
    pub practices: Vec<Practice>,
}

pub fn farming_info() -> InfoSection {
    InfoSection {
        title: "Farming Information 1",
        description: "Discover key insights for improving soil health and farm productivity. \
                      Learn about recommended practices for various soil types, crop suggestions, \
                      and irrigation methods.",
        practices: vec![
            Practice {
                title: "Crop Rotation",
                details: "Rotating crops helps in maintaining soil fertility and reducing pests.",
                resources: vec![
                    Resource {
                        title: "Research on Crop Rotation Benefits",
                        link: "https://example.com/research-crop-rotation",
                    },
                    Resource {
                        title: "Soil Health through Rotation",
                        link: "https://example.com/soil-health",
                    },
                ],
            },
            Practice {
                title: "Organic Fertilizers",
                details: "Using compost and manure enhances soil nutrients naturally.",
                resources: vec![
                    Resource {
                        title: "Organic Fertilizer Impact Study",
                        link: "https://example.com/organic-fertilizer",
                    },
                    Resource {
                        title: "Natural Fertilizers for Growth",
                        link: "https://example.com/natural-growth",
                    },
                ],
            },
            Practice {
                title: "Drip Irrigation",
                details: "Efficient water usage that targets the root zone of crops.",
                resources: vec![
                    Resource {
                        title: "Drip Irrigation Systems Guide",
                        link: "https://example.com/drip-irrigation",
                    },
                    Resource {
                        title: "Precision Watering Techniques",
                        link: "https://example.com/precision-watering",
                    },
                ],
            },
        ],
    }
}

/// plain-text rendering offered as a download
pub fn render_download(section: &InfoSection) -> String {
    let practices = section
        .practices
        .iter()
        .enumerate()
        .map(|(i, practice)| {
            let resources = practice
                .resources
                .iter()
                .enumerate()
                .map(|(j, r)| format!("   {}. {} ({})", j + 1, r.title, r.link))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{}. {} - {}\nResources:\n{}", i + 1, practice.title, practice.details, resources)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "\nFarming Information\n====================\n\nTitle: {}\n\nDescription: {}\n\nRecommended Practices:\n\n{}\n",
        section.title, section.description, practices
    )
}

/// `Farming Information 1` -> `farming_information_1.txt`
pub fn download_file_name(section: &InfoSection) -> String {
    let stem = section.title.split_whitespace().collect::<Vec<_>>().join("_").to_lowercase();
    format!("{}.txt", stem)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Advisory {
    pub severity: Severity,
    pub message: String,
}

/// notices derived from the current snapshot
pub fn advisories(snapshot: &SystemSnapshot) -> Vec<Advisory> {
    let mut out = Vec::new();
    for farm in Farm::ALL {
        let reading = snapshot.farm(farm);
        let deficit = reading.moisture_deficit();
        if deficit > DRY_MARGIN && !reading.pump_active {
            out.push(Advisory {
                severity: Severity::Warning,
                message: format!(
                    "{} moisture is {}% below its {}% target and the pump is off",
                    farm.label(),
                    deficit,
                    reading.ideal_moisture
                ),
            });
        } else if deficit < 0 && reading.pump_active {
            out.push(Advisory {
                severity: Severity::Info,
                message: format!(
                    "{} is above its {}% target while the pump is running",
                    farm.label(),
                    reading.ideal_moisture
                ),
            });
        }
    }
    if snapshot.environment.is_raining {
        out.push(Advisory {
            severity: Severity::Info,
            message: "Rain detected; consider delaying scheduled irrigation".to_string(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::StatusDecoder;

    #[test]
    fn download_name_and_layout() {
        let info = farming_info();
        assert_eq!(download_file_name(&info), "farming_information_1.txt");

        let text = render_download(&info);
        assert!(text.contains("Title: Farming Information 1"));
        assert!(text.contains("1. Crop Rotation - Rotating crops"));
        assert!(text.contains("   2. Precision Watering Techniques (https://example.com/precision-watering)"));
    }

    #[test]
    fn dry_farm_with_idle_pump_warns() {
        let snap = StatusDecoder::new()
            .decode("<STATUS:A:30:60:0:B:80:70:1:22.0:40.0:1>")
            .unwrap();
        let notes = advisories(&snap);
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].severity, Severity::Warning);
        assert!(notes[0].message.starts_with("Farm A moisture is 30% below"));
        assert_eq!(notes[1].severity, Severity::Info);
        assert!(notes[1].message.starts_with("Farm B is above"));
        assert!(notes[2].message.starts_with("Rain detected"));
    }

    #[test]
    fn healthy_snapshot_is_quiet() {
        let snap = StatusDecoder::new()
            .decode("<STATUS:A:55:60:1:B:70:70:0:22.0:40.0:0>")
            .unwrap();
        assert!(advisories(&snap).is_empty());
    }
}
