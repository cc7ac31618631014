#[cfg(test)]
#[cfg(feature = "e2e_test")]
mod common;

#[cfg(test)]
#[cfg(feature = "e2e_test")]
mod tests {
    use std::convert::TryFrom;

    use common::*;
    use cloney::config::Config;
    use cloney::config::args::parse_from_args;
    use cloney::pipeline::Pipeline;
    use cloney::types::token::create_pipeline_cancellation_token;

    use super::*;

    #[tokio::test]
    async fn s3_to_local() {
        TestHelper::init_dummy_tracing_subscriber();

        let _semaphore = SEMAPHORE.clone().acquire_owned().await.unwrap();

        let helper = TestHelper::new().await;
        helper.delete_bucket_with_cascade(&BUCKET1).await;
        helper.create_bucket(&BUCKET1, REGION).await;
        helper.put_test_objects(&BUCKET1).await;

        let download_dir = tempfile::tempdir().unwrap();
        let local_dir = download_dir.path().join("nested").join("out");
        let local_dir_str = local_dir.to_string_lossy().to_string();

        let args = vec![
            "cloney",
            "download",
            "--source-service",
            "s3",
            "--source-bucket",
            BUCKET1.as_str(),
            "--local-dir",
            &local_dir_str,
            "--aws-profile",
            PROFILE_NAME,
        ];

        let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();
        let cancellation_token = create_pipeline_cancellation_token();
        let mut pipeline = Pipeline::new(config, cancellation_token);
        pipeline.run().await;
        assert!(!pipeline.has_error());

        let report = pipeline.get_transfer_report().unwrap();
        assert_eq!(report.number_of_units, TEST_OBJECTS.len() as u64);
        assert_eq!(report.succeeded, TEST_OBJECTS.len() as u64);
        assert_eq!(report.failed, 0);

        let stats = TestHelper::get_stats_count(pipeline.get_stats_receiver());
        assert_eq!(stats.transfer_complete, TEST_OBJECTS.len() as u64);
        assert_eq!(stats.transfer_error, 0);

        for (key, size) in TEST_OBJECTS {
            let path = TestHelper::local_path(&local_dir, key);
            if key.ends_with('/') {
                assert!(path.is_dir());
                continue;
            }

            assert_eq!(std::fs::read(&path).unwrap(), TestHelper::test_body(key, size));
        }

        helper.delete_bucket_with_cascade(&BUCKET1).await;
    }

    #[tokio::test]
    async fn s3_to_local_paginated() {
        const OBJECT_COUNT: usize = 1100;

        TestHelper::init_dummy_tracing_subscriber();

        let _semaphore = SEMAPHORE.clone().acquire_owned().await.unwrap();

        let helper = TestHelper::new().await;
        helper.delete_bucket_with_cascade(&BUCKET1).await;
        helper.create_bucket(&BUCKET1, REGION).await;
        helper.put_many_objects(&BUCKET1, "many/", OBJECT_COUNT).await;

        let download_dir = tempfile::tempdir().unwrap();
        let local_dir_str = download_dir.path().to_string_lossy().to_string();

        let args = vec![
            "cloney",
            "download",
            "--source-service",
            "s3",
            "--source-bucket",
            BUCKET1.as_str(),
            "--local-dir",
            &local_dir_str,
            "--aws-profile",
            PROFILE_NAME,
            "--worker-size",
            "64",
        ];

        let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();
        let mut pipeline = Pipeline::new(config, create_pipeline_cancellation_token());
        pipeline.run().await;
        assert!(!pipeline.has_error());

        assert_eq!(
            pipeline.get_transfer_report().unwrap().succeeded,
            OBJECT_COUNT as u64
        );
        assert_eq!(
            TestHelper::list_all_files(download_dir.path()).len(),
            OBJECT_COUNT
        );

        helper.delete_bucket_with_cascade(&BUCKET1).await;
    }

    #[tokio::test]
    async fn s3_to_local_source_bucket_not_found() {
        TestHelper::init_dummy_tracing_subscriber();

        let _semaphore = SEMAPHORE.clone().acquire_owned().await.unwrap();

        let helper = TestHelper::new().await;
        helper.delete_bucket_with_cascade(&BUCKET2).await;

        let download_dir = tempfile::tempdir().unwrap();
        let local_dir_str = download_dir.path().to_string_lossy().to_string();

        let args = vec![
            "cloney",
            "download",
            "--source-service",
            "s3",
            "--source-bucket",
            BUCKET2.as_str(),
            "--local-dir",
            &local_dir_str,
            "--aws-profile",
            PROFILE_NAME,
        ];

        let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();
        let mut pipeline = Pipeline::new(config, create_pipeline_cancellation_token());
        pipeline.run().await;

        assert!(pipeline.has_error());
        assert!(pipeline.get_transfer_report().is_none());
        assert!(TestHelper::list_all_files(download_dir.path()).is_empty());
    }
}
