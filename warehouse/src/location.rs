use std::fmt;
use std::str::FromStr;

use crate::error::Error;

macro_rules! locations {
    ($($variant:ident => $name:literal,)+) => {
        /// A location a dataset can be created in.
        ///
        /// Every table and job in a dataset shares the dataset's location, and a job touching several
        /// datasets requires all of them to be in the same one.
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Location {
            $($variant,)+
            /// A region reported by the service that has no variant of its own.
            Other(String),
        }

        impl Location {
            pub const ALL: &'static [Location] = &[$(Location::$variant,)+];

            pub fn as_str(&self) -> &str {
                match self {
                    $(Location::$variant => $name,)+
                    Location::Other(name) => name,
                }
            }
        }
    };
}

locations! {
    Us => "US",
    Eu => "EU",
    UsCentral1 => "us-central1",
    UsEast1 => "us-east1",
    UsEast4 => "us-east4",
    UsWest1 => "us-west1",
    UsWest2 => "us-west2",
    NorthamericaNortheast1 => "northamerica-northeast1",
    SouthamericaEast1 => "southamerica-east1",
    EuropeNorth1 => "europe-north1",
    EuropeWest1 => "europe-west1",
    EuropeWest2 => "europe-west2",
    EuropeWest3 => "europe-west3",
    EuropeWest4 => "europe-west4",
    EuropeWest6 => "europe-west6",
    AsiaEast1 => "asia-east1",
    AsiaEast2 => "asia-east2",
    AsiaNortheast1 => "asia-northeast1",
    AsiaNortheast2 => "asia-northeast2",
    AsiaNortheast3 => "asia-northeast3",
    AsiaSouth1 => "asia-south1",
    AsiaSoutheast1 => "asia-southeast1",
    AsiaSoutheast2 => "asia-southeast2",
    AustraliaSoutheast1 => "australia-southeast1",
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = Error;

    /// Case insensitive, so `us` and `US` are the same multi-region. Only named locations are
    /// accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::ALL
            .iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .cloned()
            .ok_or_else(|| Error::validation(format!("unsupported location '{s}'")))
    }
}

impl Location {
    /// Reads a location returned by the service. Regions without a variant become [`Location::Other`].
    pub fn from_service(s: &str) -> Self {
        Location::from_str(s).unwrap_or_else(|_| Location::Other(s.trim().to_string()))
    }
}

impl serde::Serialize for Location {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Location {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.trim().is_empty() {
            return Err(serde::de::Error::custom("empty location"));
        }
        Ok(Location::from_service(&s))
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use crate::error::Error;
    use crate::location::Location;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Location::from_str("us").unwrap(), Location::Us);
        assert_eq!(Location::from_str("EU").unwrap(), Location::Eu);
        assert_eq!(Location::from_str("Asia-Northeast1").unwrap(), Location::AsiaNortheast1);
        for l in Location::ALL {
            assert_eq!(&Location::from_str(&l.to_string()).unwrap(), l);
        }
    }

    #[test]
    fn unknown_location_is_rejected() {
        assert!(matches!(Location::from_str("moon-base1"), Err(Error::Validation { .. })));
        assert!(matches!(Location::from_str(""), Err(Error::Validation { .. })));
    }

    #[test]
    fn service_regions_without_variant_are_kept() {
        assert_eq!(Location::from_service("US"), Location::Us);
        let other = Location::from_service("me-west1");
        assert_eq!(other, Location::Other("me-west1".to_string()));
        assert_eq!(other.to_string(), "me-west1");
        let l: Location = serde_json::from_str("\"me-west1\"").unwrap();
        assert_eq!(l, other);
    }

    #[test]
    fn serde_uses_canonical_name() {
        assert_eq!(serde_json::to_string(&Location::EuropeWest2).unwrap(), "\"europe-west2\"");
        let l: Location = serde_json::from_str("\"us\"").unwrap();
        assert_eq!(l, Location::Us);
    }
}
