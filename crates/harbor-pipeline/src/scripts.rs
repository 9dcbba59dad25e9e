//! Package-and-deploy snippets for external CI systems.
//!
//! Templates carry `%NAME%` placeholders that are filled from the request;
//! CI-native variables such as `${{ secrets.BOOMI_ACCOUNT_ID }}` are left for
//! the CI system to expand.

use serde::{Deserialize, Serialize};

use harbor_core::PlatformConfig;

const ACCOUNT_PLACEHOLDER: &str = "YOUR_ACCOUNT_ID";

const CURL_PACKAGE: &str = r#"curl -X POST "%BASE_URL%/%ACCOUNT_ID%/PackagedComponent" \
  -H "Content-Type: application/json" \
  -u "USERNAME:PASSWORD" \
  -d '{"componentId":"%COMPONENT_ID%","packageVersion":"%PACKAGE_VERSION%"}'"#;

const CURL_DEPLOY: &str = r#"curl -X POST "%BASE_URL%/%ACCOUNT_ID%/DeployedPackage" \
  -H "Content-Type: application/json" \
  -u "USERNAME:PASSWORD" \
  -d '{"environmentId":"%ENVIRONMENT_ID%","packageId":"PACKAGE_ID","listenerStatus":"RUNNING"}'"#;

const GITHUB_WORKFLOW: &str = r#"# .github/workflows/boomi-deploy.yml
name: Boomi Deployment
on:
  push:
    branches: [main]
  workflow_dispatch:
    inputs:
      environment:
        description: 'Target environment'
        required: true
        default: 'dev'
        type: choice
        options:
          - dev
          - test
          - prod

jobs:
  deploy:
    runs-on: ubuntu-latest
    steps:
      - name: Create Package
        run: |
          curl -X POST "%BASE_URL%/${{ secrets.BOOMI_ACCOUNT_ID }}/PackagedComponent" \
            -H "Content-Type: application/json" \
            -u "${{ secrets.BOOMI_USERNAME }}:${{ secrets.BOOMI_PASSWORD }}" \
            -d '{"componentId":"%COMPONENT_ID%","packageVersion":"${{ github.sha }}"}'

      - name: Deploy to Environment
        run: |
          curl -X POST "%BASE_URL%/${{ secrets.BOOMI_ACCOUNT_ID }}/DeployedPackage" \
            -H "Content-Type: application/json" \
            -u "${{ secrets.BOOMI_USERNAME }}:${{ secrets.BOOMI_PASSWORD }}" \
            -d '{"environmentId":"%ENVIRONMENT_ID%","packageId":"PACKAGE_ID","listenerStatus":"RUNNING"}'"#;

const JENKINSFILE: &str = r#"// Jenkinsfile
pipeline {
    agent any

    environment {
        BOOMI_ACCOUNT = credentials('boomi-account-id')
        BOOMI_CREDS = credentials('boomi-credentials')
    }

    parameters {
        choice(name: 'ENVIRONMENT', choices: ['dev', 'test', 'prod'], description: 'Target environment')
    }

    stages {
        stage('Create Package') {
            steps {
                script {
                    def response = httpRequest(
                        url: "%BASE_URL%/${BOOMI_ACCOUNT}/PackagedComponent",
                        httpMode: 'POST',
                        contentType: 'APPLICATION_JSON',
                        authentication: 'boomi-credentials',
                        requestBody: """{"componentId":"%COMPONENT_ID%","packageVersion":"${BUILD_NUMBER}"}"""
                    )
                    def pkg = readJSON text: response.content
                    env.PACKAGE_ID = pkg.packageId
                }
            }
        }

        stage('Deploy') {
            steps {
                httpRequest(
                    url: "%BASE_URL%/${BOOMI_ACCOUNT}/DeployedPackage",
                    httpMode: 'POST',
                    contentType: 'APPLICATION_JSON',
                    authentication: 'boomi-credentials',
                    requestBody: """{"environmentId":"%ENVIRONMENT_ID%","packageId":"${PACKAGE_ID}","listenerStatus":"RUNNING"}"""
                )
            }
        }
    }
}"#;

const AZURE_PIPELINE: &str = r###"# azure-pipelines.yml
trigger:
  - main

pool:
  vmImage: 'ubuntu-latest'

variables:
  - group: boomi-credentials

stages:
  - stage: Package
    jobs:
      - job: CreatePackage
        steps:
          - task: Bash@3
            displayName: 'Create Boomi Package'
            inputs:
              targetType: 'inline'
              script: |
                response=$(curl -s -X POST "%BASE_URL%/$(BOOMI_ACCOUNT_ID)/PackagedComponent" \
                  -H "Content-Type: application/json" \
                  -u "$(BOOMI_USERNAME):$(BOOMI_PASSWORD)" \
                  -d '{"componentId":"%COMPONENT_ID%","packageVersion":"$(Build.BuildNumber)"}')
                echo "##vso[task.setvariable variable=PACKAGE_ID;isOutput=true]$(echo $response | jq -r '.packageId')"

  - stage: Deploy
    dependsOn: Package
    jobs:
      - deployment: DeployToEnv
        environment: '${{ parameters.environment }}'
        strategy:
          runOnce:
            deploy:
              steps:
                - task: Bash@3
                  displayName: 'Deploy Package'
                  inputs:
                    targetType: 'inline'
                    script: |
                      curl -X POST "%BASE_URL%/$(BOOMI_ACCOUNT_ID)/DeployedPackage" \
                        -H "Content-Type: application/json" \
                        -u "$(BOOMI_USERNAME):$(BOOMI_PASSWORD)" \
                        -d '{"environmentId":"%ENVIRONMENT_ID%","packageId":"$(PACKAGE_ID)","listenerStatus":"RUNNING"}'"###;

/// CI system to generate for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiTool {
    /// Plain curl commands.
    Curl,
    /// GitHub Actions workflow.
    Github,
    /// Jenkins declarative pipeline.
    Jenkins,
    /// Azure DevOps pipeline.
    Azure,
}

/// What the generated snippets package and deploy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    /// Component to package.
    #[serde(default)]
    pub component_id: String,
    /// Version used by the curl snippet.
    #[serde(default)]
    pub package_version: String,
    /// Deployment target.
    #[serde(default)]
    pub environment_id: String,
    /// Only generate for this tool; every tool when absent.
    #[serde(default)]
    pub tool: Option<CiTool>,
}

/// Package and deploy commands for curl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurlCommands {
    /// Creates the package.
    pub package: String,
    /// Deploys the package.
    pub deploy: String,
}

/// Generated snippets, one per requested tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CiScripts {
    /// curl commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curl: Option<CurlCommands>,
    /// GitHub Actions workflow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    /// Jenkinsfile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jenkins: Option<String>,
    /// Azure pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure: Option<String>,
}

/// Fills the templates for the requested tool, or for every tool.
///
/// The account id comes from `platform`, with a placeholder when unset.
pub fn generate_scripts(request: &ScriptRequest, platform: &PlatformConfig) -> CiScripts {
    let account_id = platform
        .account_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or(ACCOUNT_PLACEHOLDER);
    let fill = |template: &str| {
        template
            .replace("%BASE_URL%", platform.base_url.trim_end_matches('/'))
            .replace("%ACCOUNT_ID%", account_id)
            .replace("%COMPONENT_ID%", &request.component_id)
            .replace("%PACKAGE_VERSION%", &request.package_version)
            .replace("%ENVIRONMENT_ID%", &request.environment_id)
    };
    let wanted = |tool: CiTool| request.tool.is_none_or(|requested| requested == tool);

    CiScripts {
        curl: wanted(CiTool::Curl).then(|| CurlCommands {
            package: fill(CURL_PACKAGE),
            deploy: fill(CURL_DEPLOY),
        }),
        github: wanted(CiTool::Github).then(|| fill(GITHUB_WORKFLOW)),
        jenkins: wanted(CiTool::Jenkins).then(|| fill(JENKINSFILE)),
        azure: wanted(CiTool::Azure).then(|| fill(AZURE_PIPELINE)),
    }
}
