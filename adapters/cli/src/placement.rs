//! Parsing of emplacement placement requests given on the command line.

use std::str::FromStr;

use thiserror::Error;
use tower_defense_core::{ArchetypeId, Command, GridCoord};

const ARCHETYPE_DELIMITER: char = '@';
const COORD_DELIMITER: char = ',';

/// Emplacement to build before waves start, written as `ARCHETYPE@X,Y`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Placement {
    pub(crate) archetype: ArchetypeId,
    pub(crate) coord: GridCoord,
}

impl Placement {
    /// World command that performs the placement.
    #[must_use]
    pub(crate) fn command(&self) -> Command {
        Command::PlaceEmplacement {
            archetype: self.archetype.clone(),
            coord: self.coord,
        }
    }
}

/// Errors produced while parsing a placement request.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum PlacementParseError {
    /// The request lacks the `@` between archetype and tile.
    #[error("expected ARCHETYPE@X,Y")]
    MissingArchetypeDelimiter,
    /// The archetype part is empty.
    #[error("archetype identifier is empty")]
    EmptyArchetype,
    /// The tile part lacks the `,` between column and row.
    #[error("expected a tile written as X,Y")]
    MissingCoordDelimiter,
    /// A tile component is not an integer.
    #[error("invalid tile component '{0}'")]
    InvalidCoord(String),
}

impl FromStr for Placement {
    type Err = PlacementParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (archetype, coord) = value
            .trim()
            .split_once(ARCHETYPE_DELIMITER)
            .ok_or(PlacementParseError::MissingArchetypeDelimiter)?;
        let archetype = archetype.trim();
        if archetype.is_empty() {
            return Err(PlacementParseError::EmptyArchetype);
        }

        let (x, y) = coord
            .split_once(COORD_DELIMITER)
            .ok_or(PlacementParseError::MissingCoordDelimiter)?;

        Ok(Self {
            archetype: ArchetypeId::from(archetype),
            coord: GridCoord::new(parse_component(x)?, parse_component(y)?),
        })
    }
}

fn parse_component(value: &str) -> Result<i32, PlacementParseError> {
    let trimmed = value.trim();
    trimmed
        .parse()
        .map_err(|_| PlacementParseError::InvalidCoord(trimmed.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_archetype_and_tile() {
        let placement: Placement = "arrow@3, 1".parse().expect("valid placement");

        assert_eq!(
            placement,
            Placement {
                archetype: ArchetypeId::from("arrow"),
                coord: GridCoord::new(3, 1),
            }
        );
        assert_eq!(
            placement.command(),
            Command::PlaceEmplacement {
                archetype: ArchetypeId::from("arrow"),
                coord: GridCoord::new(3, 1),
            }
        );
    }

    #[test]
    fn negative_tiles_parse_and_are_left_to_the_grid() {
        let placement: Placement = "frost@-1,2".parse().expect("valid placement");
        assert_eq!(placement.coord, GridCoord::new(-1, 2));
    }

    #[test]
    fn malformed_requests_are_rejected() {
        assert_eq!(
            "arrow".parse::<Placement>(),
            Err(PlacementParseError::MissingArchetypeDelimiter)
        );
        assert_eq!(
            " @1,1".parse::<Placement>(),
            Err(PlacementParseError::EmptyArchetype)
        );
        assert_eq!(
            "arrow@4".parse::<Placement>(),
            Err(PlacementParseError::MissingCoordDelimiter)
        );
        assert_eq!(
            "arrow@4,north".parse::<Placement>(),
            Err(PlacementParseError::InvalidCoord("north".to_owned()))
        );
    }
}
