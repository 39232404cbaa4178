use super::PointCloudRecord;
use geo::geometry::Rect;
use log::debug;

/// Share of `trail`'s area that `other` covers.
///
/// `None` for a degenerate (zero area) trail rectangle.
pub fn overlap_ratio(trail: &Rect<f64>, other: &Rect<f64>) -> Option<f64> {
    let trail_area = trail.width() * trail.height();
    if trail_area <= 0.0 {
        return None;
    }
    let overlap_x = (trail.max().x.min(other.max().x) - trail.min().x.max(other.min().x)).max(0.0);
    let overlap_y = (trail.max().y.min(other.max().y) - trail.min().y.max(other.min().y)).max(0.0);
    Some(overlap_x * overlap_y / trail_area)
}

/// Picks the point-cloud file for a trail.
///
/// A record uploaded for `trail_id` wins outright. Otherwise the
/// record covering the largest share of `trail_bbox` is returned if
/// that share exceeds `min_overlap`. Point-cloud tiles are often much
/// smaller than a trail, hence the low threshold.
pub fn find_best_match<'a>(
    trail_bbox: &Rect<f64>,
    catalog: &'a [PointCloudRecord],
    trail_id: Option<&str>,
    min_overlap: f64,
) -> Option<&'a PointCloudRecord> {
    if let Some(trail_id) = trail_id {
        if let Some(record) = catalog
            .iter()
            .find(|record| record.trail_id.as_deref() == Some(trail_id))
        {
            debug!("using point cloud {} uploaded for trail {trail_id}", record.id);
            return Some(record);
        }
    }

    let mut best: Option<(&PointCloudRecord, f64)> = None;
    for record in catalog {
        let Some(ratio) = record
            .bounds
            .and_then(|bounds| overlap_ratio(trail_bbox, &bounds.rect()))
        else {
            continue;
        };
        if ratio > best.map_or(0.0, |(_, best_ratio)| best_ratio) {
            best = Some((record, ratio));
        }
    }

    match best {
        Some((record, ratio)) if ratio > min_overlap => {
            debug!("matched point cloud {} (overlap {:.1}%)", record.id, ratio * 100.0);
            Some(record)
        }
        best => {
            debug!(
                "no point cloud match (best overlap {:.1}%)",
                best.map_or(0.0, |(_, ratio)| ratio) * 100.0
            );
            None
        }
    }
}
