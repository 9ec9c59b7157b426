//! Result page classification.
//!
//! [`classify`] maps the rendered lookup page to an [`Outcome`]. Markers are
//! matched against the upper-cased document text in a fixed order: blocked,
//! not found, cancelled, found. A row only counts as a voting location when
//! the table has a location header or the row is wide enough to hold one.
//! Anything else is a parse error carrying the raw page.

use censo_core::{
    CancellationDetails, CancellationKind, FailureKind, Outcome, TransientFailure, VotingLocation,
};
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

const BLOCKED_MARKERS: &[&str] = &[
    "ACCESS DENIED",
    "ACCESO DENEGADO",
    "REQUEST BLOCKED",
    "SOLICITUD BLOQUEADA",
    "ATTENTION REQUIRED",
    "UNUSUAL TRAFFIC",
    "TRÁFICO INUSUAL",
    "403 FORBIDDEN",
];

const NOT_FOUND_MARKERS: &[&str] = &[
    "NO SE ENCUENTRA EN EL CENSO",
    "NO SE ENCUENTRA",
    "NO ENCONTRADO",
    "NO APARECE",
    "NO EXISTE",
    "SIN RESULTADOS",
];

const CANCELLED_MARKERS: &[&str] = &["CANCELADA POR", "FALLECIDO", "MUERTE"];

const DECEASED_MARKERS: &[&str] = &["FALLECI", "MUERTE", "DEFUNCI"];

const LOCATION_HEADERS: &[&str] = &["DEPARTAMENTO", "PUESTO"];

/// NUIP, departamento, municipio and puesto at least.
const MIN_LOCATION_CELLS: usize = 4;

fn row_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("tr").expect("valid selector"))
}

fn cell_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("td").expect("valid selector"))
}

fn header_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("th").expect("valid selector"))
}

/// Classify a rendered result page.
///
/// Pure and idempotent: the same HTML always yields the same outcome.
#[must_use]
pub fn classify(html: &str) -> Outcome {
    let document = Html::parse_document(html);
    let text = document_text(&document);

    if let Some(marker) = find_marker(&text, BLOCKED_MARKERS) {
        return Outcome::Transient(
            TransientFailure::new(FailureKind::Blocked, format!("page contains \"{marker}\""))
                .with_raw_response(html),
        );
    }

    // Checked before cancellation: the not-found message shares boilerplate
    // with the cancellation notice
    if find_marker(&text, NOT_FOUND_MARKERS).is_some() {
        return Outcome::NotFound;
    }

    let first_row = first_data_row(&document);

    if find_marker(&text, CANCELLED_MARKERS).is_some() || has_header(&document, &["NOVEDAD"]) {
        if let Some(cells) = &first_row {
            let details = CancellationDetails {
                novedad: cell(cells, 1),
                resolucion: cell(cells, 2),
                fecha_novedad: cell(cells, 3),
            };
            let novedad = details.novedad.to_uppercase();
            let kind = if DECEASED_MARKERS.iter().any(|m| novedad.contains(m)) {
                CancellationKind::Deceased
            } else {
                CancellationKind::Other
            };
            return Outcome::Cancelled { kind, details };
        }
    }

    let is_location_row = |cells: &&Vec<String>| {
        cells.len() >= MIN_LOCATION_CELLS || has_header(&document, LOCATION_HEADERS)
    };
    if let Some(cells) = first_row.as_ref().filter(is_location_row) {
        return Outcome::Found(VotingLocation {
            departamento: cell(cells, 1),
            municipio: cell(cells, 2),
            puesto: cell(cells, 3),
            direccion: cell(cells, 4),
            mesa: cell(cells, 5),
        });
    }

    Outcome::Transient(
        TransientFailure::new(FailureKind::ParseError, "no recognizable results on page")
            .with_raw_response(html),
    )
}

fn document_text(document: &Html) -> String {
    document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn find_marker(text: &str, markers: &[&'static str]) -> Option<&'static str> {
    markers.iter().copied().find(|marker| text.contains(marker))
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cell texts of the first table row that has `td` cells.
fn first_data_row(document: &Html) -> Option<Vec<String>> {
    document
        .select(row_selector())
        .map(|row| {
            row.select(cell_selector())
                .map(|cell| element_text(&cell))
                .collect::<Vec<_>>()
        })
        .find(|cells| !cells.is_empty())
}

fn has_header(document: &Html, names: &[&str]) -> bool {
    document.select(header_selector()).any(|th| {
        let header = element_text(&th).to_uppercase();
        names.iter().any(|name| header.contains(name))
    })
}

fn cell(cells: &[String], index: usize) -> String {
    cells.get(index).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVE_PAGE: &str = r#"
        <html><body>
            <h2>Lugar de votación</h2>
            <table class="table">
                <thead>
                    <tr><th>NUIP</th><th>DEPARTAMENTO</th><th>MUNICIPIO</th>
                        <th>PUESTO</th><th>DIRECCIÓN</th><th>MESA</th></tr>
                </thead>
                <tbody>
                    <tr><td>1234567890</td><td>Antioquia</td><td>Medellín</td>
                        <td>Escuela X</td><td>Calle 1</td><td>05</td></tr>
                </tbody>
            </table>
        </body></html>
    "#;

    const CANCELLED_PAGE: &str = r#"
        <html><body>
            <table>
                <tr><th>NUIP</th><th>NOVEDAD</th><th>RESOLUCIÓN</th><th>FECHA NOVEDAD</th></tr>
                <tr><td>1234567</td><td>Cancelada por Muerte</td><td>1234</td><td>2020-01-15</td></tr>
            </table>
        </body></html>
    "#;

    #[test]
    fn test_active_row_is_found() {
        let outcome = classify(ACTIVE_PAGE);
        assert_eq!(
            outcome,
            Outcome::Found(VotingLocation {
                departamento: "Antioquia".to_string(),
                municipio: "Medellín".to_string(),
                puesto: "Escuela X".to_string(),
                direccion: "Calle 1".to_string(),
                mesa: "05".to_string(),
            })
        );
    }

    #[test]
    fn test_short_row_leaves_missing_columns_blank() {
        let html = "<table>\
            <tr><th>NUIP</th><th>DEPARTAMENTO</th><th>MUNICIPIO</th></tr>\
            <tr><td>1234567</td><td>Cundinamarca</td><td>Soacha</td></tr>\
            </table>";
        match classify(html) {
            Outcome::Found(location) => {
                assert_eq!(location.departamento, "Cundinamarca");
                assert_eq!(location.municipio, "Soacha");
                assert_eq!(location.puesto, "");
                assert_eq!(location.direccion, "");
                assert_eq!(location.mesa, "");
            }
            other => panic!("expected found, got {other:?}"),
        }
    }

    #[test]
    fn test_wide_row_without_headers_is_found() {
        let html = "<table><tr><td>1234567</td><td>Boyacá</td><td>Tunja</td><td>Colegio Y</td></tr></table>";
        match classify(html) {
            Outcome::Found(location) => {
                assert_eq!(location.departamento, "Boyacá");
                assert_eq!(location.puesto, "Colegio Y");
                assert_eq!(location.mesa, "");
            }
            other => panic!("expected found, got {other:?}"),
        }
    }

    #[test]
    fn test_unrelated_table_is_parse_error() {
        let html = r#"
            <table>
                <tr><th>Aviso</th><th>Fecha</th></tr>
                <tr><td>Mantenimiento programado</td><td>2026-03-01</td></tr>
            </table>
        "#;
        match classify(html) {
            Outcome::Transient(failure) => {
                assert_eq!(failure.kind, FailureKind::ParseError);
                assert_eq!(failure.raw_response.as_deref(), Some(html));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_deceased_cancellation() {
        match classify(CANCELLED_PAGE) {
            Outcome::Cancelled { kind, details } => {
                assert_eq!(kind, CancellationKind::Deceased);
                assert_eq!(details.novedad, "Cancelada por Muerte");
                assert_eq!(details.resolucion, "1234");
                assert_eq!(details.fecha_novedad, "2020-01-15");
            }
            other => panic!("expected cancelled, got {other:?}"),
        }
    }

    #[test]
    fn test_other_cancellation() {
        let html = r#"
            <table>
                <tr><th>NUIP</th><th>NOVEDAD</th><th>RESOLUCIÓN</th><th>FECHA NOVEDAD</th></tr>
                <tr><td>1234567</td><td>Cancelada por Doble Cedulación</td><td>77</td><td>2019-03-02</td></tr>
            </table>
        "#;
        match classify(html) {
            Outcome::Cancelled { kind, details } => {
                assert_eq!(kind, CancellationKind::Other);
                assert_eq!(details.novedad, "Cancelada por Doble Cedulación");
            }
            other => panic!("expected cancelled, got {other:?}"),
        }
    }

    #[test]
    fn test_not_found_wins_over_cancellation_markers() {
        let html = r#"
            <div class="alert">La cédula no se encuentra en el censo para esta elección.</div>
            <p>Las cédulas canceladas por muerte no aparecen en el censo.</p>
            <table><tr><th>NOVEDAD</th></tr><tr><td>1</td><td>Cancelada por Muerte</td></tr></table>
        "#;
        assert_eq!(classify(html), Outcome::NotFound);
    }

    #[test]
    fn test_blocked_wins_over_everything() {
        let html = r#"
            <h1>Access Denied</h1>
            <p>No se encuentra</p>
            <table><tr><td>1</td><td>Antioquia</td></tr></table>
        "#;
        match classify(html) {
            Outcome::Transient(failure) => {
                assert_eq!(failure.kind, FailureKind::Blocked);
                assert_eq!(failure.raw_response.as_deref(), Some(html));
            }
            other => panic!("expected blocked, got {other:?}"),
        }
    }

    #[test]
    fn test_cancellation_marker_without_row_falls_through() {
        let html = "<p>Cancelada por muerte</p>";
        match classify(html) {
            Outcome::Transient(failure) => assert_eq!(failure.kind, FailureKind::ParseError),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_page_is_parse_error_with_raw() {
        let html = "<html><body><form><input id=\"cedula\"></form></body></html>";
        match classify(html) {
            Outcome::Transient(failure) => {
                assert_eq!(failure.kind, FailureKind::ParseError);
                assert_eq!(failure.raw_response.as_deref(), Some(html));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_classification_is_idempotent() {
        for html in [ACTIVE_PAGE, CANCELLED_PAGE, "<p>Sin resultados</p>", "<p>?</p>"] {
            assert_eq!(classify(html), classify(html));
        }
    }
}
