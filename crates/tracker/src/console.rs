use std::{error::Error, fmt, str::FromStr};

use chrono::NaiveDate;
use itertools::Itertools;
use map_session::{
    codec,
    feature_index::Layer,
    session::{Command, MapSnapshot},
};
use model::geometry::{Coordinate, Geometry, GeometryKind, Wgs84};
use utility::id::Id;

pub const HELP: &str = "\
vehicle <number>        set the vehicle number
from <yyyy-mm-dd|->     set or clear the start date
to <yyyy-mm-dd|->       set or clear the end date
path                    show the path of the vehicle
all                     show all live vehicles
refresh                 reload the live vehicles
draw <kind>             start drawing a point, linestring or polygon
finish <geometry>       complete the drawing
save                    save the drawn or edited feature
view                    show all saved features
select <id>             select a saved feature
edit                    edit the selected feature
move <geometry>         complete an edit gesture
saveedit                save the edited feature
discard                 drop the drawing and the selection
delete                  delete the selected feature
reset                   back to the initial map
resize <width> <height> resize the viewport
status                  print the map state
quit

<geometry> is `<kind> lon,lat [lon,lat ...]`, polygons are closed automatically.";

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(Command),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputError(String);

impl Error for InputError {}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn error<T, S: Into<String>>(message: S) -> Result<T, InputError> {
    Err(InputError(message.into()))
}

/// Parses one console line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Input>, InputError> {
    let line = line.trim();
    let Some((word, rest)) = line
        .split_once(char::is_whitespace)
        .map(|(word, rest)| (word, rest.trim()))
        .or((!line.is_empty()).then_some((line, "")))
    else {
        return Ok(None);
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "vehicle" => Command::SetVehicleNumber(rest.to_owned()),
        "from" => Command::SetFromDate(date(rest)?),
        "to" => Command::SetToDate(date(rest)?),
        "path" => Command::ShowPath,
        "all" => Command::ShowAll,
        "refresh" => Command::RefreshVehicles,
        "draw" => Command::Draw(kind(rest)?),
        "finish" => Command::DrawEnd(codec::to_display_geometry(&geometry(rest)?)),
        "save" => Command::Save,
        "view" => Command::ViewAll,
        "select" if !rest.is_empty() => Command::Select(Id::from(rest)),
        "select" => return error("usage: select <id>"),
        "edit" => Command::EnableEdit,
        "move" => Command::ModifyEnd(codec::to_display_geometry(&geometry(rest)?)),
        "saveedit" => Command::SaveEdit,
        "discard" => Command::Discard,
        "delete" => Command::Delete,
        "reset" => Command::Reset,
        "resize" => {
            let Some((width, height)) = rest
                .split_whitespace()
                .map(f64::from_str)
                .collect_tuple()
                .and_then(|(width, height)| width.ok().zip(height.ok()))
            else {
                return error("usage: resize <width> <height>");
            };
            Command::Resize { width, height }
        }
        "status" => return Ok(Some(Input::Status)),
        "help" | "?" => return Ok(Some(Input::Help)),
        "quit" | "exit" => return Ok(Some(Input::Quit)),
        other => return error(format!("unknown command {other:?}, try `help`")),
    };
    Ok(Some(Input::Command(command)))
}

fn date(value: &str) -> Result<Option<NaiveDate>, InputError> {
    match value {
        "" | "-" => Ok(None),
        value => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(Some)
            .or_else(|_| error(format!("{value:?} is not a date (yyyy-mm-dd)"))),
    }
}

fn kind(value: &str) -> Result<GeometryKind, InputError> {
    GeometryKind::from_str(value).or_else(|why| error(why.to_string()))
}

fn coordinate(value: &str) -> Result<Coordinate<Wgs84>, InputError> {
    let parsed = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect_tuple();
    match parsed {
        Some((Ok(longitude), Ok(latitude))) => Ok(Coordinate::new(longitude, latitude)),
        _ => error(format!("{value:?} is not a coordinate (lon,lat)")),
    }
}

fn geometry(value: &str) -> Result<Geometry<Wgs84>, InputError> {
    let mut words = value.split_whitespace();
    let kind = kind(words.next().unwrap_or_default())?;
    let coordinates = words.map(coordinate).collect::<Result<Vec<_>, _>>()?;
    match kind {
        GeometryKind::Point => match coordinates.as_slice() {
            [point] => Ok(Geometry::point(*point)),
            _ => error("a point needs exactly one coordinate"),
        },
        GeometryKind::LineString if coordinates.len() >= 2 => {
            Ok(Geometry::line_string(coordinates))
        }
        GeometryKind::LineString => error("a line needs at least two coordinates"),
        GeometryKind::Polygon if coordinates.len() >= 3 => Ok(Geometry::polygon(coordinates)),
        GeometryKind::Polygon => error("a polygon needs at least three coordinates"),
    }
}

/// Multi-line summary of a snapshot.
pub fn status(snapshot: &MapSnapshot) -> String {
    let filter = &snapshot.filter;
    let range = [filter.from_date, filter.to_date]
        .iter()
        .map(|date| date.map_or("-".to_owned(), |date| date.to_string()))
        .join(" .. ");
    let layers = [Layer::Vehicles, Layer::Path, Layer::Shapes]
        .into_iter()
        .filter_map(|layer| snapshot.layer(layer))
        .map(|layer| format!("{} {}", layer.layer.name(), layer.features.len()))
        .join(", ");
    let attached = snapshot
        .attached
        .iter()
        .map(|(_, interaction)| format!("{interaction:?}"))
        .join(", ");
    let center = codec::to_storage_coordinate(snapshot.view.center);

    format!(
        "vehicle: {:?} (show all: {}), range: {range}\n\
         interaction: {:?}, can save: {}, can edit: {}, attached: [{attached}]\n\
         features: {layers}\n\
         view: {:.5},{:.5} zoom {:.1}",
        filter.vehicle_number,
        filter.show_all,
        snapshot.interaction,
        snapshot.can_save,
        snapshot.can_edit,
        center.x,
        center.y,
        snapshot.view.zoom,
    )
}
