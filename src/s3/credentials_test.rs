// SPDX-License-Identifier: EUPL-1.2

//! Outcome of credentials tests, keyed by client parameters.

use serde::Serialize;

use super::client::ParamsOfCreateS3Client;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CredentialsTestStatus {
    NotTested,
    TestOngoing,
    TestSucceeded,
    #[serde(rename_all = "camelCase")]
    TestFailed { error_message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CredentialsTestResult {
    pub params_of_create_s3_client: ParamsOfCreateS3Client,
    pub outcome: Result<(), String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialsTestState {
    pub ongoing_tests: Vec<ParamsOfCreateS3Client>,
    pub test_results: Vec<CredentialsTestResult>,
}

impl CredentialsTestState {
    pub fn status_of(&self, params: &ParamsOfCreateS3Client) -> CredentialsTestStatus {
        if self.ongoing_tests.contains(params) {
            return CredentialsTestStatus::TestOngoing;
        }

        match self
            .test_results
            .iter()
            .find(|r| &r.params_of_create_s3_client == params)
            .map(|r| &r.outcome)
        {
            None => CredentialsTestStatus::NotTested,
            Some(Ok(())) => CredentialsTestStatus::TestSucceeded,
            Some(Err(error_message)) => CredentialsTestStatus::TestFailed {
                error_message: error_message.clone(),
            },
        }
    }

    pub fn begin(&mut self, params: &ParamsOfCreateS3Client) {
        if !self.ongoing_tests.contains(params) {
            self.ongoing_tests.push(params.clone());
        }
    }

    pub fn complete(&mut self, params: &ParamsOfCreateS3Client, outcome: Result<(), String>) {
        self.ongoing_tests.retain(|p| p != params);
        self.test_results
            .retain(|r| &r.params_of_create_s3_client != params);
        self.test_results.push(CredentialsTestResult {
            params_of_create_s3_client: params.clone(),
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(url: &str) -> ParamsOfCreateS3Client {
        ParamsOfCreateS3Client::NoSts {
            url: url.into(),
            path_style_access: false,
            region: None,
            credentials: None,
        }
    }

    #[test]
    fn lifecycle_of_a_test() {
        let mut state = CredentialsTestState::default();
        let p = params("https://a");
        assert_eq!(state.status_of(&p), CredentialsTestStatus::NotTested);

        state.begin(&p);
        assert_eq!(state.status_of(&p), CredentialsTestStatus::TestOngoing);

        state.complete(&p, Err("access denied".into()));
        assert_eq!(
            state.status_of(&p),
            CredentialsTestStatus::TestFailed {
                error_message: "access denied".into()
            }
        );

        state.complete(&p, Ok(()));
        assert_eq!(state.status_of(&p), CredentialsTestStatus::TestSucceeded);
        assert_eq!(state.test_results.len(), 1);
        assert_eq!(state.status_of(&params("https://b")), CredentialsTestStatus::NotTested);
    }
}
