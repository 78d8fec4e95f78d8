//! REST API response bodies used by the source

use serde::Deserialize;

/// Tableau reports page numbers as strings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Pagination {
    page_number: String,
    page_size: String,
    total_available: String,
}

impl Pagination {
    /// Whether another page follows this one
    pub(crate) fn has_more(&self) -> bool {
        let parse = |v: &str| v.trim().parse::<usize>().unwrap_or(0);
        let page = parse(&self.page_number);
        let size = parse(&self.page_size);
        size > 0 && page * size < parse(&self.total_available)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectsResponse {
    #[serde(default)]
    pub projects: ProjectList,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProjectList {
    #[serde(default)]
    pub project: Vec<Project>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DatasourcesResponse {
    pub pagination: Pagination,
    #[serde(default)]
    pub datasources: DatasourceList,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DatasourceList {
    #[serde(default)]
    pub datasource: Vec<Datasource>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Datasource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub project: Option<ProjectRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectRef {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datasources_page() {
        let body = r#"{
            "pagination": {"pageNumber": "1", "pageSize": "100", "totalAvailable": "2"},
            "datasources": {"datasource": [
                {"id": "ds-1", "name": "Site Content", "type": "hyper",
                 "project": {"id": "p-1", "name": "Admin Insights"}},
                {"id": "ds-2", "name": "TS Users",
                 "project": {"id": "p-1", "name": "Admin Insights"}}
            ]}
        }"#;
        let page: DatasourcesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(page.datasources.datasource.len(), 2);
        assert_eq!(page.datasources.datasource[1].name, "TS Users");
        assert_eq!(
            page.datasources.datasource[0].project.as_ref().unwrap().id,
            "p-1"
        );
        assert!(!page.pagination.has_more());
    }

    #[test]
    fn test_parse_empty_page() {
        let body = r#"{
            "pagination": {"pageNumber": "1", "pageSize": "100", "totalAvailable": "0"},
            "datasources": {}
        }"#;
        let page: DatasourcesResponse = serde_json::from_str(body).unwrap();
        assert!(page.datasources.datasource.is_empty());
        assert!(!page.pagination.has_more());
    }

    #[test]
    fn test_pagination_has_more() {
        let body = r#"{"pageNumber": "2", "pageSize": "100", "totalAvailable": "250"}"#;
        let pagination: Pagination = serde_json::from_str(body).unwrap();
        assert!(pagination.has_more());

        let body = r#"{"pageNumber": "3", "pageSize": "100", "totalAvailable": "250"}"#;
        let pagination: Pagination = serde_json::from_str(body).unwrap();
        assert!(!pagination.has_more());
    }

    #[test]
    fn test_parse_projects() {
        let body = r#"{
            "pagination": {"pageNumber": "1", "pageSize": "100", "totalAvailable": "1"},
            "projects": {"project": [{"id": "p-1", "name": "Admin Insights", "description": ""}]}
        }"#;
        let projects: ProjectsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(projects.projects.project[0].id, "p-1");
        assert_eq!(projects.projects.project[0].name, "Admin Insights");
    }
}
