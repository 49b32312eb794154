use crate::domain::app::{AuthorizedApp, Delegations};
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;

#[derive(Debug, Serialize)]
struct AuthorizedAppRecord<'a> {
    package_id: &'a str,
    label: &'a str,
    methods: BTreeSet<&'a str>,
    delegations: Delegations,
    ready_to_pay: bool,
}

impl<'a> From<&'a AuthorizedApp> for AuthorizedAppRecord<'a> {
    fn from(app: &'a AuthorizedApp) -> Self {
        Self {
            package_id: app.package_id(),
            label: &app.app.label,
            methods: app.method_names(),
            delegations: app.delegations,
            ready_to_pay: app.app.has_ready_to_pay_service,
        }
    }
}

/// Writes authorized apps as a pretty-printed JSON array, sorted by package id.
pub struct ResultWriter<W: Write> {
    writer: W,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_apps(&mut self, mut apps: Vec<AuthorizedApp>) -> Result<()> {
        apps.sort_by(|a, b| a.package_id().cmp(b.package_id()));
        let records: Vec<AuthorizedAppRecord<'_>> = apps.iter().map(Into::into).collect();
        serde_json::to_writer_pretty(&mut self.writer, &records)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}
