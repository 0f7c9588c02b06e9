use std::rc::Rc;

use tracing::{debug, instrument};

use crate::driver::WireRecord;
use crate::error::ToolboxError;
use crate::geo::Coordinates;
use crate::id::DocumentId;
use crate::model::ModelRef;
use crate::query::{Criteria, Query};
use crate::toolbox::Toolbox;

/// Runs queries through the toolbox's query engine and wraps the results in
/// models.
///
/// Obtained through `Toolbox::finder`.
pub struct Finder<'a> {
    toolbox: &'a Rc<Toolbox>,
}

impl<'a> Finder<'a> {
    pub(crate) fn new(toolbox: &'a Rc<Toolbox>) -> Self {
        Finder { toolbox }
    }

    fn hydrate_all(&self, collection: &str, records: &[WireRecord]) -> Result<Vec<ModelRef>, ToolboxError> {
        let pods = self.toolbox.pods();
        records
            .iter()
            .map(|record| pods.hydrate(collection, record))
            .collect()
    }

    #[instrument(skip(self, criteria))]
    pub fn find(&self, collection: &str, criteria: &Criteria) -> Result<Vec<ModelRef>, ToolboxError> {
        let query = Query::new(collection, criteria.clone());
        let records = self.toolbox.queries().run_filtered(&query)?;
        debug!(count = records.len(), "query returned");
        self.hydrate_all(collection, &records)
    }

    pub fn find_all(&self, collection: &str) -> Result<Vec<ModelRef>, ToolboxError> {
        self.find(collection, &Criteria::new())
    }

    pub fn find_one(&self, collection: &str, criteria: &Criteria) -> Result<Option<ModelRef>, ToolboxError> {
        let found = self.find(collection, &criteria.clone().limit(1))?;
        Ok(found.into_iter().next())
    }

    /// Records of `collection` whose `field` contains `term`.
    #[instrument(skip(self, criteria))]
    pub fn search(
        &self,
        collection: &str,
        field: &str,
        term: &str,
        criteria: &Criteria,
    ) -> Result<Vec<ModelRef>, ToolboxError> {
        let query = Query::new(collection, criteria.clone());
        let records = self.toolbox.queries().run_search(&query, field, term)?;
        self.hydrate_all(collection, &records)
    }

    /// Up to `limit` models closest to `point`, each carrying its distance.
    pub fn find_near(
        &self,
        collection: &str,
        point: Coordinates,
        criteria: &Criteria,
        limit: usize,
    ) -> Result<Vec<ModelRef>, ToolboxError> {
        self.near_reference(collection, point, criteria, limit, None)
    }

    /// Models within `radius` meters of `point`, each carrying its distance.
    pub fn find_within(
        &self,
        collection: &str,
        point: Coordinates,
        radius: f64,
        criteria: &Criteria,
    ) -> Result<Vec<ModelRef>, ToolboxError> {
        self.within_reference(collection, point, radius, criteria, None)
    }

    #[instrument(skip(self, criteria))]
    pub(crate) fn near_reference(
        &self,
        collection: &str,
        point: Coordinates,
        criteria: &Criteria,
        limit: usize,
        reference_id: Option<DocumentId>,
    ) -> Result<Vec<ModelRef>, ToolboxError> {
        let query = Query::new(collection, criteria.clone());
        let records = self.toolbox.queries().run_near(&query, point, limit)?;
        let models = self.hydrate_all(collection, &records)?;
        annotate(&models, point, reference_id)?;
        Ok(models)
    }

    #[instrument(skip(self, criteria))]
    pub(crate) fn within_reference(
        &self,
        collection: &str,
        point: Coordinates,
        radius: f64,
        criteria: &Criteria,
        reference_id: Option<DocumentId>,
    ) -> Result<Vec<ModelRef>, ToolboxError> {
        let query = Query::new(collection, criteria.clone());
        let records = self.toolbox.queries().run_within(&query, point, radius)?;
        let models = self.hydrate_all(collection, &records)?;
        annotate(&models, point, reference_id)?;
        Ok(models)
    }
}

fn annotate(models: &[ModelRef], point: Coordinates, reference_id: Option<DocumentId>) -> Result<(), ToolboxError> {
    for model in models {
        model.pod()?.set_distance_info(point, reference_id.clone())?;
    }
    Ok(())
}
