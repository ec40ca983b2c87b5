//! Geographic regions.
//!
//! A [Region] is a polygon, or a set of polygons, in (longitude, latitude) coordinates. Regions
//! are built from a static bounding box, from the first geometry of a shapefile or GeoJSON file,
//! or from an explicit list of vertices.

use crate::dataset::LongitudeConvention;
use crate::error::RegionMeanError;
use crate::models::BoundingBox;

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{BooleanOps, BoundingRect, Coord, Line, LineString, MultiPolygon, Polygon, Rect, Translate};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, PolygonType};
use shapefile::{PolygonRing, Shape};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{event, Level};

/// Route segment used for ad-hoc regions, which a named region may not shadow.
const RESERVED_NAME: &str = "region";

/// A named geographic region.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    /// Name of the region
    name: String,
    /// Where the region came from
    source: String,
    /// Region outline
    polygons: MultiPolygon<f64>,
    /// Bounding rectangle of the outline
    bounds: Rect<f64>,
}

impl Region {
    /// Create and return a [Region].
    ///
    /// # Arguments
    ///
    /// * `name`: Name of the region. Must be a non-empty URL path segment of ASCII letters,
    ///   digits, `-` or `_`
    /// * `source`: Description of the region source
    /// * `polygons`: Region outline. Each ring must have at least three distinct vertices and
    ///   must not intersect itself
    pub fn new(
        name: &str,
        source: &str,
        polygons: MultiPolygon<f64>,
    ) -> Result<Self, RegionMeanError> {
        let invalid = |reason: &str| RegionMeanError::InvalidRegionSource {
            source_name: source.to_string(),
            reason: reason.to_string(),
        };
        if name.is_empty()
            || name == RESERVED_NAME
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid(&format!("invalid region name '{name}'")));
        }
        let rings = polygons
            .0
            .iter()
            .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()));
        for ring in rings {
            if ring.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
                return Err(invalid("region has non-finite coordinates"));
            }
            // Rings are closed, so a triangle has four coordinates.
            if ring.0.len() < 4 {
                return Err(invalid("region rings need at least three vertices"));
            }
            if !is_simple_ring(ring) {
                return Err(invalid("region ring intersects itself"));
            }
        }
        let bounds = polygons
            .bounding_rect()
            .ok_or_else(|| invalid("region is empty"))?;
        Ok(Region {
            name: name.to_string(),
            source: source.to_string(),
            polygons,
            bounds,
        })
    }

    /// Create a rectangular region from a bounding box.
    pub fn from_bbox(name: &str, bbox: &BoundingBox) -> Result<Self, RegionMeanError> {
        let rect = Rect::new(
            Coord {
                x: bbox.min_lon,
                y: bbox.min_lat,
            },
            Coord {
                x: bbox.max_lon,
                y: bbox.max_lat,
            },
        );
        let source = format!(
            "bbox({}, {}, {}, {})",
            bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat
        );
        Self::new(name, &source, MultiPolygon::new(vec![rect.to_polygon()]))
    }

    /// Create a region from a single ring of (longitude, latitude) vertices.
    ///
    /// The ring is closed automatically if the last vertex differs from the first.
    pub fn from_vertices(name: &str, vertices: &[[f64; 2]]) -> Result<Self, RegionMeanError> {
        let exterior = vertices
            .iter()
            .map(|[lon, lat]| (*lon, *lat))
            .collect::<Vec<_>>();
        let polygon = Polygon::new(LineString::from(exterior), vec![]);
        Self::new(name, "polygon", MultiPolygon::new(vec![polygon]))
    }

    /// Create a region from the first geometry of a shapefile.
    ///
    /// Outer rings each start a polygon; inner rings are attached to the preceding polygon.
    pub fn from_shapefile(name: &str, path: &Path) -> Result<Self, RegionMeanError> {
        let source = path.display().to_string();
        let invalid = |reason: String| RegionMeanError::InvalidRegionSource {
            source_name: source.clone(),
            reason,
        };
        let shapes = shapefile::read_shapes(path).map_err(|err| invalid(err.to_string()))?;
        event!(
            Level::DEBUG,
            "read {} shapes from {}",
            shapes.len(),
            path.display()
        );
        let first = shapes
            .into_iter()
            .next()
            .ok_or_else(|| invalid("shapefile contains no geometries".to_string()))?;
        let polygons = match first {
            Shape::Polygon(polygon) => polygons_from_rings(polygon.rings(), |p| (p.x, p.y)),
            Shape::PolygonM(polygon) => polygons_from_rings(polygon.rings(), |p| (p.x, p.y)),
            Shape::PolygonZ(polygon) => polygons_from_rings(polygon.rings(), |p| (p.x, p.y)),
            _ => return Err(invalid("first geometry is not a polygon".to_string())),
        };
        Self::new(name, &source, polygons)
    }

    /// Create a region from the first polygonal geometry of a GeoJSON file.
    pub fn from_geojson(name: &str, path: &Path) -> Result<Self, RegionMeanError> {
        let source = path.display().to_string();
        let invalid = |reason: String| RegionMeanError::InvalidRegionSource {
            source_name: source.clone(),
            reason,
        };
        let file = File::open(path).map_err(|err| invalid(err.to_string()))?;
        let geojson =
            GeoJson::from_reader(BufReader::new(file)).map_err(|err| invalid(err.to_string()))?;
        let geometries = match geojson {
            GeoJson::FeatureCollection(fc) => {
                fc.features.into_iter().filter_map(|f| f.geometry).collect()
            }
            GeoJson::Feature(f) => f.geometry.into_iter().collect(),
            GeoJson::Geometry(g) => vec![g],
        };
        let polygons = geometries
            .into_iter()
            .find_map(|geometry| polygons_from_geometry(geometry.value))
            .ok_or_else(|| invalid("no polygon geometry found".to_string()))?
            .map_err(invalid)?;
        Self::new(name, &source, polygons)
    }

    /// Name of the region.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description of where the region came from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Region outline.
    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    /// Bounding rectangle of the outline.
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    /// Returns whether a point lies inside the region.
    ///
    /// Uses the even-odd rule over every ring of the region, so holes and disjoint parts are
    /// handled alike. Points on the boundary follow a half-open rule: a ray is cast towards
    /// increasing longitude and an edge is crossed when its endpoints straddle the point's
    /// latitude as `(y1 > lat) != (y2 > lat)` at a longitude strictly greater than the point's.
    /// For a rectangle the western and southern edges are inside, the eastern and northern edges
    /// are outside.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        if lon < min.x || lon > max.x || lat < min.y || lat > max.y {
            return false;
        }
        let mut inside = false;
        for polygon in &self.polygons.0 {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                for line in ring.lines() {
                    let (a, b) = (line.start, line.end);
                    if (a.y > lat) != (b.y > lat) {
                        let crossing = a.x + (lat - a.y) * (b.x - a.x) / (b.y - a.y);
                        if lon < crossing {
                            inside = !inside;
                        }
                    }
                }
            }
        }
        inside
    }

    /// Returns a copy of the region remapped onto a longitude convention, or `None` if the region
    /// already fits it.
    ///
    /// The region is shifted by whole turns and clipped to the longitude range of the convention,
    /// so a region straddling the seam is split into a part at each end of the range.
    pub fn to_convention(&self, convention: LongitudeConvention) -> Option<Region> {
        let west = convention.west();
        let east = west + 360.0;
        let (min, max) = (self.bounds.min(), self.bounds.max());
        if min.x >= west && max.x <= east {
            return None;
        }
        let band = Rect::new(
            Coord {
                x: west,
                y: min.y - 1.0,
            },
            Coord {
                x: east,
                y: max.y + 1.0,
            },
        )
        .to_polygon();
        let first = ((west - max.x) / 360.0).floor() as i32;
        let last = ((east - min.x) / 360.0).ceil() as i32;
        let mut polygons = Vec::new();
        for turn in first..=last {
            let offset = 360.0 * f64::from(turn);
            if max.x + offset <= west || min.x + offset >= east {
                continue;
            }
            for polygon in &self.polygons.0 {
                polygons.extend(polygon.translate(offset, 0.0).intersection(&band));
            }
        }
        event!(
            Level::DEBUG,
            region = %self.name,
            "remapped onto {} in {} parts",
            convention,
            polygons.len()
        );
        let polygons = MultiPolygon::new(polygons);
        let bounds = polygons.bounding_rect().unwrap_or(self.bounds);
        Some(Region {
            name: self.name.clone(),
            source: self.source.clone(),
            polygons,
            bounds,
        })
    }

    /// Returns the region as a GeoJSON feature collection with a single feature.
    pub fn to_geojson(&self) -> FeatureCollection {
        let mut polygons: Vec<PolygonType> = self
            .polygons
            .0
            .iter()
            .map(|polygon| {
                std::iter::once(polygon.exterior())
                    .chain(polygon.interiors())
                    .map(|ring| ring.coords().map(|c| vec![c.x, c.y]).collect())
                    .collect()
            })
            .collect();
        let value = if polygons.len() == 1 {
            geojson::Value::Polygon(polygons.remove(0))
        } else {
            geojson::Value::MultiPolygon(polygons)
        };
        let mut properties = JsonObject::new();
        properties.insert("name".to_string(), self.name.clone().into());
        properties.insert("source".to_string(), self.source.clone().into());
        let feature = Feature {
            bbox: None,
            geometry: Some(Geometry::new(value)),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        };
        FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        }
    }
}

/// Returns whether a closed ring is simple, i.e. no two of its edges meet other than adjacent
/// edges at their shared vertex.
pub fn is_simple_ring(ring: &LineString<f64>) -> bool {
    let lines = ring
        .lines()
        .filter(|line| line.start != line.end)
        .collect::<Vec<_>>();
    let n = lines.len();
    let min_x = |line: &Line<f64>| line.start.x.min(line.end.x);
    let mut order = (0..n).collect::<Vec<_>>();
    order.sort_by(|a, b| min_x(&lines[*a]).total_cmp(&min_x(&lines[*b])));
    for (k, &i) in order.iter().enumerate() {
        let max_x = lines[i].start.x.max(lines[i].end.x);
        for &j in order[k + 1..]
            .iter()
            .take_while(|j| min_x(&lines[**j]) <= max_x)
        {
            let Some(intersection) = line_intersection(lines[i], lines[j]) else {
                continue;
            };
            let (a, b) = (i.min(j), i.max(j));
            let adjacent = b == a + 1 || (a == 0 && b == n - 1);
            match intersection {
                LineIntersection::SinglePoint { .. } if adjacent => (),
                _ => return false,
            }
        }
    }
    true
}

fn polygons_from_rings<P>(
    rings: &[PolygonRing<P>],
    xy: impl Fn(&P) -> (f64, f64),
) -> MultiPolygon<f64> {
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for ring in rings {
        let coords = ring.points().iter().map(&xy).collect::<Vec<_>>();
        let line = LineString::from(coords);
        match (ring, polygons.last_mut()) {
            (PolygonRing::Inner(_), Some(polygon)) => polygon.interiors_push(line),
            _ => polygons.push(Polygon::new(line, vec![])),
        }
    }
    MultiPolygon::new(polygons)
}

fn polygons_from_geometry(value: geojson::Value) -> Option<Result<MultiPolygon<f64>, String>> {
    let polygons = match value {
        geojson::Value::Polygon(polygon) => vec![polygon],
        geojson::Value::MultiPolygon(polygons) => polygons,
        geojson::Value::GeometryCollection(geometries) => {
            return geometries
                .into_iter()
                .find_map(|geometry| polygons_from_geometry(geometry.value))
        }
        _ => return None,
    };
    let polygons = polygons
        .into_iter()
        .filter(|rings| !rings.is_empty())
        .map(|mut rings| {
            let exterior = line_string(rings.remove(0))?;
            let interiors = rings
                .into_iter()
                .map(line_string)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Polygon::new(exterior, interiors))
        })
        .collect::<Result<Vec<_>, String>>();
    Some(polygons.map(MultiPolygon::new))
}

fn line_string(positions: Vec<Vec<f64>>) -> Result<LineString<f64>, String> {
    positions
        .into_iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err("position has fewer than two coordinates".to_string()),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}
