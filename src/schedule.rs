//! Station registry
//!
//! Immutable `(region, weekday) → stations` tables. Built once and passed
//! by reference to every pipeline step that needs to know which stations
//! draw on a given date.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::types::{day_of_week, Region, Station, WeekdayScope};

/// Draw schedule of one region
#[derive(Debug, Clone)]
pub struct RegionSchedule {
    /// A nationwide region always draws one station; the per-day
    /// province is informational only
    pub nationwide: bool,
    /// Province slugs drawing on each weekday (0 = Monday)
    pub by_weekday: [Vec<&'static str>; 7],
}

/// Static schedule of all regions
#[derive(Debug, Clone)]
pub struct StationSchedule {
    regions: BTreeMap<Region, RegionSchedule>,
    display_names: BTreeMap<&'static str, &'static str>,
}

impl StationSchedule {
    pub fn new(regions: BTreeMap<Region, RegionSchedule>) -> Self {
        Self {
            regions,
            display_names: BTreeMap::new(),
        }
    }

    pub fn with_display_names(mut self, names: &[(&'static str, &'static str)]) -> Self {
        self.display_names.extend(names.iter().copied());
        self
    }

    /// The Vietnamese XSMB / XSMN schedule
    pub fn vietnam() -> Self {
        let mut regions = BTreeMap::new();
        regions.insert(
            Region::Xsmb,
            RegionSchedule {
                nationwide: true,
                by_weekday: [
                    vec!["ha-noi"],
                    vec!["quang-ninh"],
                    vec!["bac-ninh"],
                    vec!["ha-noi"],
                    vec!["hai-phong"],
                    vec!["nam-dinh"],
                    vec!["thai-binh"],
                ],
            },
        );
        regions.insert(
            Region::Xsmn,
            RegionSchedule {
                nationwide: false,
                by_weekday: [
                    vec!["tp-hcm", "dong-thap", "ca-mau"],
                    vec!["ben-tre", "vung-tau", "bac-lieu"],
                    vec!["dong-nai", "can-tho", "soc-trang"],
                    vec!["tay-ninh", "an-giang", "binh-thuan"],
                    vec!["vinh-long", "binh-duong", "tra-vinh"],
                    vec!["tp-hcm", "long-an", "binh-phuoc", "hau-giang"],
                    vec!["tien-giang", "kien-giang", "da-lat"],
                ],
            },
        );

        Self::new(regions).with_display_names(&[
            ("ha-noi", "Hà Nội"),
            ("quang-ninh", "Quảng Ninh"),
            ("bac-ninh", "Bắc Ninh"),
            ("hai-phong", "Hải Phòng"),
            ("nam-dinh", "Nam Định"),
            ("thai-binh", "Thái Bình"),
            ("tp-hcm", "TP. HCM"),
            ("dong-thap", "Đồng Tháp"),
            ("ca-mau", "Cà Mau"),
            ("ben-tre", "Bến Tre"),
            ("vung-tau", "Vũng Tàu"),
            ("bac-lieu", "Bạc Liêu"),
            ("dong-nai", "Đồng Nai"),
            ("can-tho", "Cần Thơ"),
            ("soc-trang", "Sóc Trăng"),
            ("tay-ninh", "Tây Ninh"),
            ("an-giang", "An Giang"),
            ("binh-thuan", "Bình Thuận"),
            ("vinh-long", "Vĩnh Long"),
            ("binh-duong", "Bình Dương"),
            ("tra-vinh", "Trà Vinh"),
            ("long-an", "Long An"),
            ("binh-phuoc", "Bình Phước"),
            ("hau-giang", "Hậu Giang"),
            ("tien-giang", "Tiền Giang"),
            ("kien-giang", "Kiên Giang"),
            ("da-lat", "Đà Lạt"),
        ])
    }

    pub fn is_nationwide(&self, region: Region) -> bool {
        self.regions.get(&region).map(|r| r.nationwide).unwrap_or(false)
    }

    /// Stations drawing on `date`
    pub fn stations_on(&self, date: NaiveDate) -> Vec<Station> {
        let dow = day_of_week(date) as usize;
        let mut stations = Vec::new();
        for (region, schedule) in &self.regions {
            if schedule.nationwide {
                stations.push(Station::nationwide(*region));
            } else {
                stations.extend(
                    schedule.by_weekday[dow]
                        .iter()
                        .map(|slug| Station::province(*region, *slug)),
                );
            }
        }
        stations
    }

    /// Whether `station` draws on `date`
    pub fn draws_on(&self, station: &Station, date: NaiveDate) -> bool {
        self.stations_on(date).contains(station)
    }

    /// Every station known to the schedule, deduplicated
    pub fn all_stations(&self) -> Vec<Station> {
        let mut stations: Vec<Station> = Vec::new();
        for (region, schedule) in &self.regions {
            if schedule.nationwide {
                stations.push(Station::nationwide(*region));
                continue;
            }
            for day in &schedule.by_weekday {
                for slug in day {
                    let station = Station::province(*region, *slug);
                    if !stations.contains(&station) {
                        stations.push(station);
                    }
                }
            }
        }
        stations
    }

    /// Weekdays on which a station draws
    pub fn weekdays_for(&self, station: &Station) -> Vec<u8> {
        let Some(schedule) = self.regions.get(&station.region) else {
            return Vec::new();
        };
        if schedule.nationwide {
            return (0..7).collect();
        }
        let Some(slug) = station.province.as_deref() else {
            return Vec::new();
        };
        schedule
            .by_weekday
            .iter()
            .enumerate()
            .filter(|(_, day)| day.contains(&slug))
            .map(|(d, _)| d as u8)
            .collect()
    }

    /// Scopes a station trains in by default: one unscoped model for a
    /// nationwide station, one model per drawing weekday otherwise
    pub fn default_scopes(&self, station: &Station) -> Vec<WeekdayScope> {
        if self.is_nationwide(station.region) {
            vec![WeekdayScope::All]
        } else {
            self.weekdays_for(station)
                .into_iter()
                .map(WeekdayScope::Weekday)
                .collect()
        }
    }

    /// Informational province of a nationwide draw on `date`
    pub fn rotating_province(&self, region: Region, date: NaiveDate) -> Option<&'static str> {
        let schedule = self.regions.get(&region)?;
        if !schedule.nationwide {
            return None;
        }
        schedule.by_weekday[day_of_week(date) as usize].first().copied()
    }

    pub fn display_name(&self, station: &Station) -> String {
        match station.province.as_deref() {
            Some(slug) => self
                .display_names
                .get(slug)
                .map(|n| n.to_string())
                .unwrap_or_else(|| slug.to_string()),
            None => station.region.to_string(),
        }
    }
}

impl Default for StationSchedule {
    fn default() -> Self {
        Self::vietnam()
    }
}
