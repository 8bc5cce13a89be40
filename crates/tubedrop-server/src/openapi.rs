use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tubedrop API",
        version = "0.3.0",
        description = "Asynchronous video downloads with progress polling and file delivery."
    ),
    paths(
        crate::routes::video_info,
        crate::routes::download,
        crate::routes::progress,
        crate::routes::download_file,
        crate::routes::download_thumbnail,
        crate::routes::job_thumbnail,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::VideoInfoRequest,
        crate::dto::VideoInfoResponse,
        crate::dto::QualityOptionResponse,
        crate::dto::DownloadRequestBody,
        crate::dto::DownloadResponse,
        crate::dto::ThumbnailRequest,
        crate::dto::ProgressResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "videos", description = "Video metadata"),
        (name = "downloads", description = "Download jobs and file delivery"),
        (name = "thumbnails", description = "Thumbnail images"),
        (name = "system", description = "Health and system status"),
    )
)]
pub struct ApiDoc;
