use crate::*;
use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;

const DEFAULT_CATALOG: &str = include_str!("default_catalog.json");

/// Candidate identifier, unique within an area
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CandidateId(pub u32);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CandidateId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CandidateId(s.trim().parse()?))
    }
}

/// An electoral area: a district name plus an area number within it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AreaKey {
    pub district: String,
    pub area_number: u32,
}

impl AreaKey {
    pub fn new(district: &str, area_number: u32) -> Self {
        AreaKey {
            district: district.to_owned(),
            area_number,
        }
    }
}

impl fmt::Display for AreaKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/area_{}", self.district, self.area_number)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub logo: String,
}

/// The candidates standing in one area, in ballot order.
///
/// The position of a candidate here is its slot in the one-hot ballot vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    candidates: IndexMap<CandidateId, Candidate>,
}

impl Area {
    pub fn candidate_ids(&self) -> Vec<CandidateId> {
        self.candidates.keys().copied().collect()
    }

    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.get(&id)
    }

    /// Candidate at a given ballot slot
    pub fn candidate_at(&self, index: usize) -> Option<(CandidateId, &Candidate)> {
        self.candidates.get_index(index).map(|(id, c)| (*id, c))
    }

    pub fn candidates(&self) -> impl Iterator<Item = (CandidateId, &Candidate)> {
        self.candidates.iter().map(|(id, c)| (*id, c))
    }

    /// Width of the one-hot vector for this area
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Static candidate catalog: (district, area, candidate) -> candidate details.
///
/// Areas and candidates keep the order they were declared in, which fixes
/// both the one-hot slot order and the order of tally output.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateCatalog {
    areas: IndexMap<AreaKey, Area>,
}

impl CandidateCatalog {
    /// Parse a catalog document
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let doc: CatalogDocument =
            serde_json::from_str(json).map_err(|e| Error::InvalidInput(e.to_string()))?;
        Self::from_document(doc)
    }

    fn from_document(doc: CatalogDocument) -> Result<Self, Error> {
        let mut areas = IndexMap::new();
        for district in doc.districts {
            for area in district.areas {
                let key = AreaKey::new(&district.name, area.number);
                if area.candidates.is_empty() {
                    return Err(Error::InvalidInput(format!("area {} has no candidates", key)));
                }

                let mut candidates = IndexMap::new();
                for entry in area.candidates {
                    let candidate = Candidate {
                        name: entry.name,
                        logo: entry.logo,
                    };
                    if candidates.insert(entry.id, candidate).is_some() {
                        return Err(Error::InvalidInput(format!(
                            "candidate {} listed twice in {}",
                            entry.id, key
                        )));
                    }
                }

                if areas.contains_key(&key) {
                    return Err(Error::InvalidInput(format!("area {} listed twice", key)));
                }
                areas.insert(key, Area { candidates });
            }
        }
        Ok(CandidateCatalog { areas })
    }

    pub fn area(&self, key: &AreaKey) -> Option<&Area> {
        self.areas.get(key)
    }

    /// Look up an area, failing with `UnknownArea`
    pub fn require_area(&self, key: &AreaKey) -> Result<&Area, Error> {
        self.area(key).ok_or_else(|| Error::UnknownArea(key.clone()))
    }

    pub fn areas(&self) -> impl Iterator<Item = (&AreaKey, &Area)> {
        self.areas.iter()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Render the catalog back into its document form
    pub fn to_json(&self) -> String {
        let mut districts: IndexMap<&str, Vec<AreaDocument>> = IndexMap::new();
        for (key, area) in self.areas.iter() {
            let candidates = area
                .candidates()
                .map(|(id, c)| CandidateDocument {
                    id,
                    name: c.name.clone(),
                    logo: c.logo.clone(),
                })
                .collect();
            districts
                .entry(key.district.as_str())
                .or_default()
                .push(AreaDocument {
                    number: key.area_number,
                    candidates,
                });
        }

        let doc = CatalogDocument {
            districts: districts
                .into_iter()
                .map(|(name, areas)| DistrictDocument {
                    name: name.to_owned(),
                    areas,
                })
                .collect(),
        };

        // Plain data with string keys cannot fail to serialize
        serde_json::to_string_pretty(&doc).unwrap_or_default()
    }
}

impl Default for CandidateCatalog {
    /// The built-in catalog: three districts of three areas with four candidates each
    fn default() -> Self {
        CandidateCatalog::from_json(DEFAULT_CATALOG)
            .expect("heballot: built-in candidate catalog is malformed")
    }
}

#[derive(Serialize, Deserialize)]
struct CatalogDocument {
    districts: Vec<DistrictDocument>,
}

#[derive(Serialize, Deserialize)]
struct DistrictDocument {
    name: String,
    areas: Vec<AreaDocument>,
}

#[derive(Serialize, Deserialize)]
struct AreaDocument {
    number: u32,
    candidates: Vec<CandidateDocument>,
}

#[derive(Serialize, Deserialize)]
struct CandidateDocument {
    id: CandidateId,
    name: String,
    #[serde(default)]
    logo: String,
}
